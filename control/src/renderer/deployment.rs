//! Relay Deployment rendered from a Dataplane template

use crate::apis::{Dataplane, Gateway};
use crate::renderer::metadata::{
    controller_annotations, controller_labels, gateway_owner_reference, selector_labels,
    MetadataMerge, MetadataSource,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

/// Name of the relay container
pub const CONTAINER_NAME: &str = "turngated";

/// Where the relay reads its configuration document
pub const CONFIG_MOUNT_PATH: &str = "/etc/turngated";

const CONFIG_VOLUME: &str = "turngated-config";

/// Relay Deployment for `gateway` in `namespace`
pub fn render_deployment(gateway: &Gateway, namespace: &str, dataplane: &Dataplane) -> Deployment {
    let spec = &dataplane.spec;
    let name = gateway.name_any();

    let labels = MetadataMerge::new()
        .layer(MetadataSource::ControllerOwned, controller_labels(gateway))
        .layer(MetadataSource::Dataplane, dataplane.labels().clone())
        .merge();
    let selector = selector_labels(gateway);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.image_pull_policy.clone(),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
        resources: spec.resources.clone(),
        env: Some(vec![EnvVar {
            name: "TURNGATE_ADDR".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "status.podIP".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(controller_annotations(gateway)),
            owner_references: gateway_owner_reference(gateway).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    termination_grace_period_seconds: spec.termination_grace_period_seconds,
                    host_network: Some(spec.host_network),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
