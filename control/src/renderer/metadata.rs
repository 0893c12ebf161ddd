//! Labels, annotations and their precedence
//!
//! Rendered objects collect metadata from several sources. [`MetadataMerge`]
//! applies them low to high precedence so the winner of every key is
//! decided by [`MetadataSource`] order alone:
//!
//! controller-owned < dataplane < gateway-config < gateway

use crate::apis::{Gateway, GatewayConfig};
use crate::store::ObjectKey;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Marks objects managed by the operator
pub const OWNED_BY_LABEL: &str = "turngate.io/owned-by";
pub const OWNED_BY_VALUE: &str = "turngate-operator";

/// Name of the Gateway an object was rendered for
pub const RELATED_GATEWAY_LABEL: &str = "turngate.io/related-gateway-name";

/// Namespace of the Gateway an object was rendered for
pub const RELATED_GATEWAY_NAMESPACE_LABEL: &str = "turngate.io/related-gateway-namespace";

/// `<namespace>/<name>` of the Gateway an object was rendered for
pub const RELATED_GATEWAY_ANNOTATION: &str = "turngate.io/related-gateway";

/// Pod label selected by relay Deployments and Services
pub const APP_LABEL: &str = "app";
pub const APP_VALUE: &str = "turngate";

/// Service type override: `LoadBalancer`, `NodePort` or `ClusterIP`
pub const SERVICE_TYPE_ANNOTATION: &str = "turngate.io/service-type";

/// Allow UDP and TCP listeners on one load-balancer Service
pub const MIXED_PROTOCOL_ANNOTATION: &str = "turngate.io/enable-mixed-protocol-lb";

/// Where a label or annotation came from, in increasing precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataSource {
    ControllerOwned,
    Dataplane,
    GatewayConfig,
    Gateway,
}

/// Ordered merge of label/annotation maps
#[derive(Debug, Default)]
pub struct MetadataMerge {
    layers: Vec<(MetadataSource, BTreeMap<String, String>)>,
}

impl MetadataMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source; call order does not matter
    pub fn layer(mut self, source: MetadataSource, entries: BTreeMap<String, String>) -> Self {
        self.layers.push((source, entries));
        self
    }

    fn ordered(&self) -> Vec<&(MetadataSource, BTreeMap<String, String>)> {
        let mut layers: Vec<_> = self.layers.iter().collect();
        // stable: equal sources keep insertion order
        layers.sort_by_key(|(source, _)| *source);
        layers
    }

    pub fn merge(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for (_, entries) in self.ordered() {
            merged.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Source that supplied the winning value of `key`
    #[cfg(test)]
    pub fn provenance(&self, key: &str) -> Option<MetadataSource> {
        self.ordered()
            .into_iter()
            .rev()
            .find(|(_, entries)| entries.contains_key(key))
            .map(|(source, _)| *source)
    }
}

/// `owned-by`, `related-gateway-name`, `related-gateway-namespace`
pub fn controller_labels(gateway: &Gateway) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNED_BY_LABEL.to_string(), OWNED_BY_VALUE.to_string()),
        (RELATED_GATEWAY_LABEL.to_string(), gateway.name_any()),
        (
            RELATED_GATEWAY_NAMESPACE_LABEL.to_string(),
            gateway.namespace().unwrap_or_default(),
        ),
    ])
}

/// `related-gateway: <namespace>/<name>`
pub fn controller_annotations(gateway: &Gateway) -> BTreeMap<String, String> {
    BTreeMap::from([(
        RELATED_GATEWAY_ANNOTATION.to_string(),
        gateway_key(gateway).to_string(),
    )])
}

/// Pod labels matched by the Deployment selector and the Service
pub fn selector_labels(gateway: &Gateway) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_VALUE.to_string()),
        (RELATED_GATEWAY_LABEL.to_string(), gateway.name_any()),
        (
            RELATED_GATEWAY_NAMESPACE_LABEL.to_string(),
            gateway.namespace().unwrap_or_default(),
        ),
    ])
}

pub fn gateway_key(gateway: &Gateway) -> ObjectKey {
    ObjectKey::new(gateway.namespace().unwrap_or_default(), gateway.name_any())
}

/// Controller owner reference pointing at the Gateway
pub fn gateway_owner_reference(gateway: &Gateway) -> Option<OwnerReference> {
    gateway.controller_owner_ref(&())
}

/// Annotation value, gateway first, then the config's LB annotations
fn gateway_or_config_annotation(
    gateway: &Gateway,
    config: Option<&GatewayConfig>,
    key: &str,
) -> Option<String> {
    if let Some(value) = gateway.annotations().get(key) {
        return Some(value.clone());
    }
    config.and_then(|c| c.spec.lb_annotations().get(key).cloned())
}

/// Mixed-protocol opt-in; a gateway annotation overrides the config's
pub fn mixed_protocol_enabled(gateway: &Gateway, config: Option<&GatewayConfig>) -> bool {
    gateway_or_config_annotation(gateway, config, MIXED_PROTOCOL_ANNOTATION)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Requested service type, if any
pub fn service_type_override(gateway: &Gateway, config: Option<&GatewayConfig>) -> Option<String> {
    gateway_or_config_annotation(gateway, config, SERVICE_TYPE_ANNOTATION)
}
