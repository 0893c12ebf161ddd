//! Relay authentication settings
//!
//! Credentials come inline from the GatewayConfig or, when `authRef` is
//! set, from a Secret with the keys `type`, `username`, `password` and
//! `secret`. Values in the Secret take precedence over inline ones.

use crate::apis::GatewayConfig;
use crate::error::CriticalError;
use crate::store::{ObjectKey, StoreSnapshot};
use common::{AuthConfig, AuthType, DEFAULT_REALM};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

/// Raw credential fields before the auth type is known
#[derive(Debug, Default)]
struct Credentials {
    auth_type: Option<String>,
    username: Option<String>,
    password: Option<String>,
    secret: Option<String>,
}

fn secret_value(secret: &Secret, key: &str) -> Result<Option<String>, CriticalError> {
    if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
        return Ok(Some(value.clone()));
    }
    match secret.data.as_ref().and_then(|d| d.get(key)) {
        Some(bytes) => String::from_utf8(bytes.0.clone()).map(Some).map_err(|_| {
            CriticalError::InvalidAuthConfig(format!(
                "Secret {} key {} is not valid UTF-8",
                secret.name_any(),
                key
            ))
        }),
        None => Ok(None),
    }
}

fn from_secret(secret: &Secret) -> Result<Credentials, CriticalError> {
    Ok(Credentials {
        auth_type: secret_value(secret, "type")?,
        username: secret_value(secret, "username")?,
        password: secret_value(secret, "password")?,
        secret: secret_value(secret, "secret")?,
    })
}

/// Build and validate the `auth` section for `config`
pub fn render_auth(config: &GatewayConfig, snapshot: &StoreSnapshot) -> Result<AuthConfig, CriticalError> {
    let spec = &config.spec;
    let mut creds = Credentials {
        auth_type: spec.auth_type.clone(),
        username: spec.user_name.clone(),
        password: spec.password.clone(),
        secret: spec.shared_secret.clone(),
    };

    if let Some(auth_ref) = &spec.auth_ref {
        let namespace = auth_ref
            .namespace
            .clone()
            .or_else(|| config.namespace())
            .unwrap_or_default();
        let key = ObjectKey::new(namespace, &auth_ref.name);
        let secret = snapshot
            .secrets
            .get(&key)
            .ok_or_else(|| CriticalError::ExternalAuthCredentialsNotFound(key.to_string()))?;

        debug!("Using external auth credentials from Secret {}", key);
        let external = from_secret(&secret)?;
        creds = Credentials {
            auth_type: external.auth_type.or(creds.auth_type),
            username: external.username.or(creds.username),
            password: external.password.or(creds.password),
            secret: external.secret.or(creds.secret),
        };
    }

    let auth_type: AuthType = creds
        .auth_type
        .as_deref()
        .unwrap_or(AuthType::Plaintext.as_str())
        .parse()?;

    let mut credentials = BTreeMap::new();
    match auth_type {
        AuthType::Plaintext => {
            if let Some(username) = creds.username {
                credentials.insert("username".to_string(), username);
            }
            if let Some(password) = creds.password {
                credentials.insert("password".to_string(), password);
            }
        }
        AuthType::Longterm => {
            if let Some(secret) = creds.secret {
                credentials.insert("secret".to_string(), secret);
            }
        }
    }

    let auth = AuthConfig {
        auth_type,
        realm: spec
            .realm
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REALM.to_string()),
        credentials,
    };
    auth.validate()?;
    Ok(auth)
}
