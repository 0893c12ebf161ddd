//! UDPRoute CRD
//!
//! Attaches backend Services to Gateway listeners. A route may name several
//! parents and reports one status entry per parent.

use crate::apis::status::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Group of Gateway API resources referenced as parents
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// UDPRoute binds relay traffic received on a listener to backend Services.
///
/// Example:
/// ```yaml
/// apiVersion: turngate.io/v1
/// kind: UDPRoute
/// metadata:
///   name: media-plane
///   namespace: default
/// spec:
///   parentRefs:
///   - name: udp-gateway
///     sectionName: udp-listener
///   rules:
///   - backendRefs:
///     - name: media-server
///       namespace: media
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "turngate.io",
    version = "v1",
    kind = "UDPRoute",
    namespaced,
    status = "UDPRouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,

    #[serde(default)]
    pub rules: Vec<UDPRouteRule>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl ParentReference {
    /// Whether this reference points at a Gateway (group and kind default to it)
    pub fn targets_gateway(&self) -> bool {
        let group_ok = self
            .group
            .as_deref()
            .map_or(true, |g| g.is_empty() || g == GATEWAY_API_GROUP);
        let kind_ok = self.kind.as_deref().map_or(true, |k| k == "Gateway");
        group_ok && kind_ok
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteRule {
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct UDPRouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    pub controller_name: String,
    pub conditions: Vec<Condition>,
}
