//! Dataplane CRD
//!
//! Template for the relay workload rendered for each Gateway in managed
//! mode. Labels on the Dataplane object are copied onto the Deployment.

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Dataplane describes the relay Deployment.
///
/// Example:
/// ```yaml
/// apiVersion: turngate.io/v1
/// kind: Dataplane
/// metadata:
///   name: default
/// spec:
///   image: turngate/turngated:latest
///   command: ["turngated"]
///   args: ["-w", "--udp-thread-num=16"]
///   replicas: 1
///   hostNetwork: false
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "turngate.io",
    version = "v1",
    kind = "Dataplane",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataplaneSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Relay replicas per Gateway (default: 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,

    #[serde(default)]
    pub host_network: bool,
}
