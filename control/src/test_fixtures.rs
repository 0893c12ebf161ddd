//! Reusable resource fixtures for unit tests
//!
//! Objects are built from JSON so they read like the manifests they model.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::apis::{Dataplane, Gateway, GatewayClass, GatewayConfig, UDPRoute};
use crate::config::DEFAULT_CONTROLLER_NAME;
use crate::renderer::metadata::RELATED_GATEWAY_ANNOTATION;
use crate::store::Stores;
use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use serde_json::{json, Value};

pub const NAMESPACE: &str = "testnamespace";
pub const CLASS_NAME: &str = "gatewayclass-ok";
pub const GATEWAY_NAME: &str = "gateway-1";
pub const GATEWAY_UID: &str = "gateway-1-uid";
pub const CONFIG_NAME: &str = "gatewayconfig-ok";

pub fn gateway_class() -> GatewayClass {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": {"name": CLASS_NAME, "generation": 1},
        "spec": {
            "controllerName": DEFAULT_CONTROLLER_NAME,
            "parametersRef": {
                "group": "turngate.io",
                "kind": "GatewayConfig",
                "name": CONFIG_NAME,
                "namespace": NAMESPACE
            }
        }
    }))
    .unwrap()
}

pub fn gateway_config() -> GatewayConfig {
    serde_json::from_value(json!({
        "apiVersion": "turngate.io/v1",
        "kind": "GatewayConfig",
        "metadata": {"name": CONFIG_NAME, "namespace": NAMESPACE},
        "spec": {
            "realm": "turngate.io",
            "authType": "plaintext",
            "userName": "user-1",
            "password": "pass-1",
            "logLevel": "all:DEBUG",
            "minPort": 1,
            "maxPort": 2,
            "dataplane": "default"
        }
    }))
    .unwrap()
}

pub fn gateway_with_listeners(listeners: &[(&str, i32, &str)]) -> Gateway {
    let listeners: Vec<Value> = listeners
        .iter()
        .map(|(name, port, protocol)| json!({"name": name, "port": port, "protocol": protocol}))
        .collect();

    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": {
            "name": GATEWAY_NAME,
            "namespace": NAMESPACE,
            "uid": GATEWAY_UID,
            "generation": 1
        },
        "spec": {
            "gatewayClassName": CLASS_NAME,
            "listeners": listeners
        }
    }))
    .unwrap()
}

/// Gateway with one UDP, one unsupported and one TCP listener
pub fn gateway() -> Gateway {
    gateway_with_listeners(&[
        ("gateway-1-listener-udp", 1, "TURN-UDP"),
        ("invalid", 3, "dummy"),
        ("gateway-1-listener-tcp", 2, "TURN-TCP"),
    ])
}

pub fn udp_route(name: &str, parents: &[(&str, Option<&str>)], backends: &[&str]) -> UDPRoute {
    let parent_refs: Vec<Value> = parents
        .iter()
        .map(|(gw, section)| match section {
            Some(section) => json!({"name": gw, "sectionName": section}),
            None => json!({"name": gw}),
        })
        .collect();
    let backend_refs: Vec<Value> = backends.iter().map(|b| json!({"name": b})).collect();

    serde_json::from_value(json!({
        "apiVersion": "turngate.io/v1",
        "kind": "UDPRoute",
        "metadata": {"name": name, "namespace": NAMESPACE, "generation": 1},
        "spec": {
            "parentRefs": parent_refs,
            "rules": [{"backendRefs": backend_refs}]
        }
    }))
    .unwrap()
}

pub fn backend_service(name: &str, cluster_ip: Option<&str>) -> Service {
    let mut spec = json!({"ports": [{"name": "udp", "port": 9001, "protocol": "UDP"}]});
    if let Some(ip) = cluster_ip {
        spec["clusterIP"] = json!(ip);
    }
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": name, "namespace": NAMESPACE},
        "spec": spec
    }))
    .unwrap()
}

/// LoadBalancer Service owned by [`gateway`]
pub fn owned_service(ports: Value, ingress: Value) -> Service {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": GATEWAY_NAME,
            "namespace": NAMESPACE,
            "annotations": {
                RELATED_GATEWAY_ANNOTATION: format!("{}/{}", NAMESPACE, GATEWAY_NAME)
            },
            "ownerReferences": [{
                "apiVersion": "gateway.networking.k8s.io/v1",
                "kind": "Gateway",
                "name": GATEWAY_NAME,
                "uid": GATEWAY_UID
            }]
        },
        "spec": {"type": "LoadBalancer", "ports": ports},
        "status": {"loadBalancer": {"ingress": ingress}}
    }))
    .unwrap()
}

/// Owned Service exposing UDP:1 behind LB address 1.2.3.4
pub fn default_owned_service() -> Service {
    owned_service(
        json!([{"name": "gateway-1-listener-udp", "port": 1, "protocol": "UDP"}]),
        json!([{"ip": "1.2.3.4"}]),
    )
}

pub fn endpoint_slice(service: &str, addresses: &[&str]) -> EndpointSlice {
    let endpoints: Vec<Value> = addresses
        .iter()
        .map(|a| json!({"addresses": [a], "conditions": {"ready": true}}))
        .collect();
    serde_json::from_value(json!({
        "apiVersion": "discovery.k8s.io/v1",
        "kind": "EndpointSlice",
        "metadata": {
            "name": format!("{}-abcde", service),
            "namespace": NAMESPACE,
            "labels": {"kubernetes.io/service-name": service}
        },
        "addressType": "IPv4",
        "endpoints": endpoints
    }))
    .unwrap()
}

pub fn node(name: &str, external_ip: &str) -> Node {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name},
        "status": {"addresses": [
            {"type": "InternalIP", "address": "10.0.0.1"},
            {"type": "ExternalIP", "address": external_ip}
        ]}
    }))
    .unwrap()
}

pub fn dataplane() -> Dataplane {
    serde_json::from_value(json!({
        "apiVersion": "turngate.io/v1",
        "kind": "Dataplane",
        "metadata": {"name": "default", "labels": {"dummy-label": "dummy-value"}},
        "spec": {
            "image": "testimage-1",
            "imagePullPolicy": "Always",
            "command": ["testcommand-1"],
            "args": ["arg-1", "arg-2"],
            "resources": {
                "limits": {"cpu": "2", "memory": "512M"},
                "requests": {"cpu": "250m", "memory": "128M"}
            },
            "replicas": 3,
            "terminationGracePeriodSeconds": 3600,
            "hostNetwork": true
        }
    }))
    .unwrap()
}

/// Stores with a valid class, config, gateway, route, backend and address
pub fn populated_stores() -> Stores {
    let stores = Stores::new();
    stores.gateway_classes.upsert(gateway_class());
    stores.gateway_configs.upsert(gateway_config());
    stores.gateways.upsert(gateway());
    stores.udp_routes.upsert(udp_route(
        "udproute-ok",
        &[(GATEWAY_NAME, None)],
        &["testservice-ok"],
    ));
    stores
        .services
        .upsert(backend_service("testservice-ok", Some("4.3.2.1")));
    stores.endpoint_slices.upsert(endpoint_slice(
        "testservice-ok",
        &["1.2.3.4", "1.2.3.5", "1.2.3.6", "1.2.3.7"],
    ));
    stores.services.upsert(default_owned_service());
    stores.dataplanes.upsert(dataplane());
    stores
}
