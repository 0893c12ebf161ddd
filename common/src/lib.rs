//! turngate Common Types
//!
//! The relay configuration document rendered by the operator and consumed by
//! the `turngated` dataplane. One document describes one gateway: its admin
//! identity, authentication, listeners and upstream clusters.
//!
//! The document is serialized as JSON under a single ConfigMap key
//! ([`CONFIG_FILENAME`]). Serialization is deterministic: every collection is
//! either an ordered `Vec` or a `BTreeMap`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ConfigMap key holding the rendered relay configuration
pub const CONFIG_FILENAME: &str = "turngated.conf";

/// Default log level for relay instances
pub const DEFAULT_LOG_LEVEL: &str = "all:INFO";

/// Default authentication realm
pub const DEFAULT_REALM: &str = "turngate.io";

/// Lowest relay port handed out by default
pub const DEFAULT_MIN_RELAY_PORT: u16 = 1;

/// Highest relay port handed out by default
pub const DEFAULT_MAX_RELAY_PORT: u16 = 65535;

/// Errors raised while validating or parsing a relay configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid authentication type: {0}")]
    InvalidAuthType(String),

    #[error("missing username and/or password for plaintext authentication")]
    MissingUsernamePassword,

    #[error("missing shared-secret for longterm authentication")]
    MissingSharedSecret,

    #[error("unsupported listener protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("duplicate listener name: {0}")]
    DuplicateListener(String),

    #[error("cluster {0} is STATIC but has no endpoints")]
    EmptyStaticCluster(String),

    #[error("listener {name}: relay port range {min}-{max} is empty")]
    InvalidRelayPortRange { name: String, min: u16, max: u16 },

    #[error("malformed configuration document: {0}")]
    Malformed(String),
}

// ============================================================================
// Protocols
// ============================================================================

/// Relay listener protocol
///
/// Plain `UDP` and `TCP` are accepted on input as aliases of `TURN-UDP` and
/// `TURN-TCP`; they are always rendered in their TURN form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ListenerProtocol {
    #[serde(rename = "TURN-UDP")]
    TurnUdp,
    #[serde(rename = "TURN-TCP")]
    TurnTcp,
    #[serde(rename = "TURN-TLS")]
    TurnTls,
    #[serde(rename = "TURN-DTLS")]
    TurnDtls,
}

/// Transport class used for port conflict detection and Service ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolClass {
    Udp,
    Tcp,
}

impl ListenerProtocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::TurnUdp => "TURN-UDP",
            ListenerProtocol::TurnTcp => "TURN-TCP",
            ListenerProtocol::TurnTls => "TURN-TLS",
            ListenerProtocol::TurnDtls => "TURN-DTLS",
        }
    }

    /// UDP-like: TURN-UDP, TURN-DTLS. TCP-like: TURN-TCP, TURN-TLS.
    pub const fn class(&self) -> ProtocolClass {
        match self {
            ListenerProtocol::TurnUdp | ListenerProtocol::TurnDtls => ProtocolClass::Udp,
            ListenerProtocol::TurnTcp | ListenerProtocol::TurnTls => ProtocolClass::Tcp,
        }
    }
}

impl FromStr for ListenerProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TURN-UDP" | "UDP" => Ok(ListenerProtocol::TurnUdp),
            "TURN-TCP" | "TCP" => Ok(ListenerProtocol::TurnTcp),
            "TURN-TLS" => Ok(ListenerProtocol::TurnTls),
            "TURN-DTLS" => Ok(ListenerProtocol::TurnDtls),
            other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProtocolClass {
    /// Kubernetes Service port protocol for this class
    pub const fn service_protocol(&self) -> &'static str {
        match self {
            ProtocolClass::Udp => "UDP",
            ProtocolClass::Tcp => "TCP",
        }
    }
}

impl fmt::Display for ProtocolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_protocol())
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authentication mode of a relay instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// Static username/password
    Plaintext,
    /// Time-windowed credentials derived from a shared secret
    Longterm,
}

impl AuthType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuthType::Plaintext => "plaintext",
            AuthType::Longterm => "longterm",
        }
    }
}

impl FromStr for AuthType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plaintext" | "static" => Ok(AuthType::Plaintext),
            "longterm" | "ephemeral" | "timewindowed" => Ok(AuthType::Longterm),
            _ => Err(ConfigError::InvalidAuthType(s.to_string())),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Document
// ============================================================================

/// Complete configuration of one relay instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub admin: AdminConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// `<namespace>/<gateway-name>`
    pub name: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub realm: String,
    /// `username`/`password` for plaintext, `secret` for longterm
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// `<namespace>/<gateway-name>/<listener-name>`
    pub name: String,
    pub protocol: ListenerProtocol,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,
    pub min_relay_port: u16,
    pub max_relay_port: u16,
    /// Attached route names, `<namespace>/<route-name>`
    #[serde(default)]
    pub routes: Vec<String>,
}

/// Upstream resolution mode of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterType {
    /// Concrete IP addresses
    #[serde(rename = "STATIC")]
    Static,
    /// DNS names resolved by the relay
    #[serde(rename = "STRICT_DNS")]
    StrictDns,
}

impl ClusterType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Static => "STATIC",
            ClusterType::StrictDns => "STRICT_DNS",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// `<namespace>/<route-name>`
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub endpoints: Vec<String>,
}

impl AuthConfig {
    /// Check that the credentials required by the auth type are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let present = |key: &str| self.credentials.get(key).is_some_and(|v| !v.is_empty());
        match self.auth_type {
            AuthType::Plaintext if !(present("username") && present("password")) => {
                Err(ConfigError::MissingUsernamePassword)
            }
            AuthType::Longterm if !present("secret") => Err(ConfigError::MissingSharedSecret),
            _ => Ok(()),
        }
    }
}

impl ClusterConfig {
    /// Append an endpoint unless an equal one is already present
    pub fn push_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
        }
    }
}

impl RelayConfig {
    /// Validate document-level invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;

        let mut names = HashSet::new();
        for listener in &self.listeners {
            if !names.insert(listener.name.as_str()) {
                return Err(ConfigError::DuplicateListener(listener.name.clone()));
            }
            if listener.min_relay_port > listener.max_relay_port {
                return Err(ConfigError::InvalidRelayPortRange {
                    name: listener.name.clone(),
                    min: listener.min_relay_port,
                    max: listener.max_relay_port,
                });
            }
        }

        for cluster in &self.clusters {
            if cluster.cluster_type == ClusterType::Static && cluster.endpoints.is_empty() {
                return Err(ConfigError::EmptyStaticCluster(cluster.name.clone()));
            }
        }

        Ok(())
    }

    /// Serialize into the text stored under [`CONFIG_FILENAME`]
    pub fn to_document(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Parse a rendered document
    ///
    /// Returns `Ok(None)` for the empty document published for invalidated
    /// gateways.
    pub fn from_document(doc: &str) -> Result<Option<Self>, ConfigError> {
        if doc.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(doc)
            .map(Some)
            .map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerConfig> {
        self.listeners.iter().find(|l| l.name == name)
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.name == name)
    }
}
