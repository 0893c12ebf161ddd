//! Configuration for the turngate operator
//!
//! Toggles consumed by the render pipeline. The renderer clones the config
//! once at the start of each pass and never mutates it.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Controller name written into route parent statuses
pub const DEFAULT_CONTROLLER_NAME: &str = "turngate.io/gateway-operator";

/// How relay workloads are provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataplaneMode {
    /// One Deployment per Gateway, rendered from a Dataplane template
    #[default]
    Managed,
    /// Relay workloads are deployed by the user; no Deployment is rendered
    Legacy,
}

impl FromStr for DataplaneMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "managed" => Ok(DataplaneMode::Managed),
            "legacy" => Ok(DataplaneMode::Legacy),
            other => Err(format!("unknown dataplane mode '{}'", other)),
        }
    }
}

impl fmt::Display for DataplaneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataplaneMode::Managed => write!(f, "managed"),
            DataplaneMode::Legacy => write!(f, "legacy"),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Controller name (GatewayClass spec.controllerName)
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// Resolve backends to pod addresses instead of service DNS names
    #[serde(default = "default_true")]
    pub enable_endpoint_discovery: bool,

    /// Also relay to the Service ClusterIP (requires endpoint discovery)
    #[serde(default = "default_true")]
    pub enable_relay_to_cluster_ip: bool,

    #[serde(default)]
    pub dataplane_mode: DataplaneMode,

    /// DNS suffix for STRICT_DNS cluster endpoints
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,

    /// Quiet period between a store change and the render pass it triggers
    #[serde(default = "default_render_debounce_ms")]
    pub render_debounce_ms: u64,

    /// Bind address of the `/metrics` endpoint, empty disables it
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cluster_domain() -> String {
    "cluster.local".to_string()
}

fn default_render_debounce_ms() -> u64 {
    250
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: default_controller_name(),
            enable_endpoint_discovery: default_true(),
            enable_relay_to_cluster_ip: default_true(),
            dataplane_mode: DataplaneMode::default(),
            cluster_domain: default_cluster_domain(),
            render_debounce_ms: default_render_debounce_ms(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn parse_bool(key: &str, val: &str) -> Result<bool, Box<dyn std::error::Error>> {
    val.parse::<bool>()
        .map_err(|_| format!("{} must be 'true' or 'false', got '{}'", key, val).into())
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();

        if let Ok(val) = env::var("TURNGATE_CONTROLLER_NAME") {
            config.controller_name = val;
        }

        if let Ok(val) = env::var("TURNGATE_ENABLE_ENDPOINT_DISCOVERY") {
            config.enable_endpoint_discovery =
                parse_bool("TURNGATE_ENABLE_ENDPOINT_DISCOVERY", &val)?;
        }

        if let Ok(val) = env::var("TURNGATE_ENABLE_RELAY_TO_CLUSTER_IP") {
            config.enable_relay_to_cluster_ip =
                parse_bool("TURNGATE_ENABLE_RELAY_TO_CLUSTER_IP", &val)?;
        }

        if let Ok(val) = env::var("TURNGATE_DATAPLANE_MODE") {
            config.dataplane_mode = val.parse()?;
        }

        if let Ok(val) = env::var("TURNGATE_CLUSTER_DOMAIN") {
            config.cluster_domain = val;
        }

        if let Ok(val) = env::var("TURNGATE_RENDER_DEBOUNCE_MS") {
            config.render_debounce_ms = val
                .parse()
                .map_err(|_| format!("TURNGATE_RENDER_DEBOUNCE_MS must be a number, got '{}'", val))?;
        }

        if let Ok(val) = env::var("TURNGATE_METRICS_ADDR") {
            config.metrics_addr = val;
        }

        Ok(config)
    }

    /// Cluster IPs are only relayed to when endpoints are discovered
    pub fn relay_to_cluster_ip(&self) -> bool {
        self.enable_endpoint_discovery && self.enable_relay_to_cluster_ip
    }
}
