//! Relay configuration document and its ConfigMap

use crate::apis::{Gateway, GatewayConfig};
use crate::renderer::address::{public_port_for, PublicAddress};
use crate::renderer::listener::{ListenerResolution, ListenerState};
use crate::renderer::metadata::{
    controller_annotations, controller_labels, gateway_key, gateway_owner_reference,
};
use crate::renderer::route::{routes_for_listener, Attachment};
use common::{
    AdminConfig, AuthConfig, ClusterConfig, ListenerConfig, RelayConfig, CONFIG_FILENAME,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_RELAY_PORT, DEFAULT_MIN_RELAY_PORT,
};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Everything the document of one gateway is assembled from
pub struct RelayInputs<'a> {
    pub gateway: &'a Gateway,
    pub config: &'a GatewayConfig,
    pub auth: AuthConfig,
    pub listeners: &'a ListenerResolution,
    pub attachments: &'a [Attachment],
    /// One per attached route with a resolvable backend, route key order
    pub clusters: Vec<ClusterConfig>,
    pub address: Option<&'a PublicAddress>,
    pub service: Option<&'a Service>,
}

pub fn render_admin(gateway: &Gateway, config: &GatewayConfig) -> AdminConfig {
    AdminConfig {
        name: gateway_key(gateway).to_string(),
        loglevel: config
            .spec
            .log_level
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
    }
}

/// Relay port range, falling back to the full range for unset or bogus bounds
pub fn relay_port_range(config: &GatewayConfig) -> (u16, u16) {
    let bound = |value: Option<i32>, default: u16| {
        value
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v != 0)
            .unwrap_or(default)
    };
    (
        bound(config.spec.min_port, DEFAULT_MIN_RELAY_PORT),
        bound(config.spec.max_port, DEFAULT_MAX_RELAY_PORT),
    )
}

fn render_listener(inputs: &RelayInputs<'_>, listener: &ListenerState) -> Option<ListenerConfig> {
    let protocol = listener.protocol?;
    let port = listener.port_u16()?;
    let (min_relay_port, max_relay_port) = relay_port_range(inputs.config);

    Some(ListenerConfig {
        name: format!("{}/{}", gateway_key(inputs.gateway), listener.name),
        protocol,
        port,
        public_address: inputs.address.map(|a| a.addr.clone()),
        public_port: inputs
            .address
            .and_then(|a| public_port_for(listener, a, inputs.service)),
        min_relay_port,
        max_relay_port,
        routes: routes_for_listener(inputs.attachments, &listener.name),
    })
}

/// Assemble the document for one gateway
pub fn render_relay_config(inputs: RelayInputs<'_>) -> RelayConfig {
    let listeners = inputs
        .listeners
        .accepted()
        .filter_map(|l| render_listener(&inputs, l))
        .collect();

    RelayConfig {
        admin: render_admin(inputs.gateway, inputs.config),
        listeners,
        clusters: inputs.clusters,
        auth: inputs.auth,
    }
}

/// ConfigMap carrying `document` for `gateway`
///
/// An empty `document` is what invalidated gateways publish.
pub fn render_config_map(gateway: &Gateway, namespace: &str, document: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(gateway.name_any()),
            namespace: Some(namespace.to_string()),
            labels: Some(controller_labels(gateway)),
            annotations: Some(controller_annotations(gateway)),
            owner_references: gateway_owner_reference(gateway).map(|o| vec![o]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CONFIG_FILENAME.to_string(), document)])),
        ..Default::default()
    }
}

/// Document stored in a rendered ConfigMap, `None` when absent
pub fn config_map_document(config_map: &ConfigMap) -> Option<&str> {
    config_map
        .data
        .as_ref()
        .and_then(|d| d.get(CONFIG_FILENAME))
        .map(String::as_str)
}
