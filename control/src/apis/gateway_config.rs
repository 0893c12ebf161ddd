//! GatewayConfig CRD
//!
//! Per-class operator configuration referenced from a GatewayClass
//! `parametersRef`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the operator's own resources
pub const TURNGATE_GROUP: &str = "turngate.io";

/// GatewayConfig holds the relay settings shared by every Gateway of a class.
///
/// Example:
/// ```yaml
/// apiVersion: turngate.io/v1
/// kind: GatewayConfig
/// metadata:
///   name: turngate-config
///   namespace: turngate
/// spec:
///   realm: turngate.io
///   authType: plaintext
///   userName: user-1
///   password: pass-1
///   dataplane: default
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "turngate.io",
    version = "v1",
    kind = "GatewayConfig",
    namespaced,
    shortname = "gwconf",
    printcolumn = r#"{"name":"Realm","type":"string","jsonPath":".spec.realm"}"#,
    printcolumn = r#"{"name":"Auth","type":"string","jsonPath":".spec.authType"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigSpec {
    /// Authentication realm (default: turngate.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// `plaintext` or `longterm` (default: plaintext)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,

    /// Secret holding the credentials; overrides the inline fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_ref: Option<SecretReference>,

    /// Relay log level, e.g. `all:INFO`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_port: Option<i32>,

    /// Name of the Dataplane template (default: `default`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataplane: Option<String>,

    /// Annotations added to every rendered load-balancer Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_service_annotations: Option<BTreeMap<String, String>>,
}

/// Reference to a Secret, namespace defaults to the referrer's
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl GatewayConfigSpec {
    pub fn dataplane_name(&self) -> &str {
        self.dataplane.as_deref().unwrap_or("default")
    }

    pub fn lb_annotations(&self) -> BTreeMap<String, String> {
        self.load_balancer_service_annotations
            .clone()
            .unwrap_or_default()
    }
}
