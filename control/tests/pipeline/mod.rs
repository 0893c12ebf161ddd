//! Render pipeline test harness
//!
//! Loads multi-document YAML manifests into a [`Stores`], runs a render pass
//! and offers lookups into the resulting [`UpdateQueue`].

pub mod manifests;

use common::RelayConfig;
use serde::Deserialize;
use std::sync::Arc;
use turngate_control::apis::status::{Condition, ConditionType, GatewayStatus, ListenerStatus};
use turngate_control::apis::udp_route::{RouteParentStatus, UDPRouteStatus};
use turngate_control::config::ControllerConfig;
use turngate_control::renderer::relay_config::config_map_document;
use turngate_control::renderer::Renderer;
use turngate_control::store::{ObjectKey, Stores};
use turngate_control::update::UpdateQueue;

/// Parse `yaml` and upsert every document into `stores` by kind
pub fn load(stores: &Stores, yaml: &str) {
    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(doc).expect("valid YAML document");
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .expect("manifest without kind")
            .to_string();

        let stored = match kind.as_str() {
            "GatewayClass" => stores.gateway_classes.upsert(parse(value)),
            "GatewayConfig" => stores.gateway_configs.upsert(parse(value)),
            "Gateway" => stores.gateways.upsert(parse(value)),
            "UDPRoute" => stores.udp_routes.upsert(parse(value)),
            "Service" => stores.services.upsert(parse(value)),
            "EndpointSlice" => stores.endpoint_slices.upsert(parse(value)),
            "Node" => stores.nodes.upsert(parse(value)),
            "Secret" => stores.secrets.upsert(parse(value)),
            "Dataplane" => stores.dataplanes.upsert(parse(value)),
            other => panic!("unexpected kind in manifest: {}", other),
        };
        assert!(stored, "{} manifest has no name", kind);
    }
}

fn parse<K: serde::de::DeserializeOwned>(value: serde_yaml::Value) -> K {
    serde_yaml::from_value(value).expect("manifest matches its kind")
}

/// Stores populated from several manifest sets, later sets win
pub fn stores_from(manifests: &[&str]) -> Arc<Stores> {
    let stores = Stores::new();
    for yaml in manifests {
        load(&stores, yaml);
    }
    Arc::new(stores)
}

pub fn render(stores: Arc<Stores>, config: ControllerConfig) -> UpdateQueue {
    Renderer::new(stores, config).render_all()
}

/// Parsed relay document of the ConfigMap at `namespace/name`
///
/// `None` when the ConfigMap carries the empty document.
pub fn document(queue: &UpdateQueue, namespace: &str, name: &str) -> Option<RelayConfig> {
    let cm = queue
        .config_maps
        .get(&ObjectKey::new(namespace, name))
        .unwrap_or_else(|| panic!("no ConfigMap staged for {}/{}", namespace, name));
    let text = config_map_document(cm).expect("ConfigMap carries a document key");
    RelayConfig::from_document(text).expect("document parses")
}

pub fn gateway_status<'a>(queue: &'a UpdateQueue, namespace: &str, name: &str) -> &'a GatewayStatus {
    &queue
        .gateway_statuses
        .get(&ObjectKey::new(namespace, name))
        .unwrap_or_else(|| panic!("no status staged for Gateway {}/{}", namespace, name))
        .status
}

pub fn route_status<'a>(queue: &'a UpdateQueue, namespace: &str, name: &str) -> &'a UDPRouteStatus {
    &queue
        .route_statuses
        .get(&ObjectKey::new(namespace, name))
        .unwrap_or_else(|| panic!("no status staged for UDPRoute {}/{}", namespace, name))
        .status
}

pub fn listener_status<'a>(status: &'a GatewayStatus, name: &str) -> &'a ListenerStatus {
    status
        .listeners
        .iter()
        .find(|l| l.name == name)
        .unwrap_or_else(|| panic!("no status for listener {}", name))
}

pub fn parent_status<'a>(status: &'a UDPRouteStatus, gateway: &str) -> &'a RouteParentStatus {
    status
        .parents
        .iter()
        .find(|p| p.parent_ref.name == gateway)
        .unwrap_or_else(|| panic!("no parent status for Gateway {}", gateway))
}

pub fn condition(conditions: &[Condition], type_: ConditionType) -> &Condition {
    conditions
        .iter()
        .find(|c| c.type_ == type_)
        .unwrap_or_else(|| panic!("no {} condition", type_))
}
