//! Public address resolution
//!
//! Finds the Service a Gateway owns and derives the address clients use to
//! reach the relay. Load-balancer ingress entries win; a Service with no
//! ingress information at all falls back to a node address and node port.

use crate::apis::Gateway;
use crate::error::NonCriticalError;
use crate::renderer::listener::ListenerState;
use crate::renderer::metadata::{gateway_key, RELATED_GATEWAY_ANNOTATION};
use crate::store::StoreSnapshot;
use common::{ListenerProtocol, ProtocolClass};
use k8s_openapi::api::core::v1::{Node, Service, ServicePort};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

/// How the public address was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    LoadBalancer,
    NodePort,
}

/// Externally reachable address of a Gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAddress {
    pub addr: String,
    pub port: i32,
    pub source: AddressSource,
    /// True when `addr` came from an ingress hostname
    pub is_hostname: bool,
}

impl PublicAddress {
    /// Gateway API address type
    pub fn address_type(&self) -> &'static str {
        if self.is_hostname {
            "Hostname"
        } else {
            "IPAddress"
        }
    }
}

/// The Service owned by `gateway`, if any
///
/// Ownership needs both the `related-gateway` annotation and an owner
/// reference to the Gateway's UID.
pub fn find_owned_service(gateway: &Gateway, snapshot: &StoreSnapshot) -> Option<Arc<Service>> {
    let key = gateway_key(gateway).to_string();
    let uid = gateway.metadata.uid.as_deref()?;

    snapshot.services.iter().find(|svc| {
        let annotated = svc.annotations().get(RELATED_GATEWAY_ANNOTATION) == Some(&key);
        let owned = svc
            .owner_references()
            .iter()
            .any(|owner| owner.kind == "Gateway" && owner.uid == uid);
        annotated && owned
    })
}

fn port_protocol(port: &ServicePort) -> &str {
    port.protocol.as_deref().unwrap_or("TCP")
}

/// Service ports matching some listener by number and protocol class
fn candidate_ports<'a>(gateway: &Gateway, service: &'a Service) -> Vec<&'a ServicePort> {
    let listeners: Vec<(i32, ProtocolClass)> = gateway
        .spec
        .listeners
        .iter()
        .filter_map(|l| {
            let protocol = l.protocol.parse::<ListenerProtocol>().ok()?;
            Some((l.port, protocol.class()))
        })
        .collect();

    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .filter(|sp| {
                    listeners.iter().any(|(port, class)| {
                        *port == sp.port && class.service_protocol() == port_protocol(sp)
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// First node address, ExternalIP preferred over InternalIP
pub fn first_node_address(nodes: &[Arc<Node>]) -> Option<String> {
    let find = |wanted: &str| {
        nodes.iter().find_map(|node| {
            node.status
                .as_ref()?
                .addresses
                .as_ref()?
                .iter()
                .find(|a| a.type_ == wanted && !a.address.is_empty())
                .map(|a| a.address.clone())
        })
    };
    find("ExternalIP").or_else(|| find("InternalIP"))
}

/// Resolve the public address of `gateway`
pub fn resolve_address(
    gateway: &Gateway,
    snapshot: &StoreSnapshot,
) -> Result<PublicAddress, NonCriticalError> {
    let key = gateway_key(gateway).to_string();
    let not_found = |why: &str| NonCriticalError::PublicAddressNotFound(format!("{}: {}", key, why));

    let service = find_owned_service(gateway, snapshot).ok_or_else(|| not_found("no owned Service"))?;
    let candidates = candidate_ports(gateway, &service);
    if candidates.is_empty() {
        return Err(not_found("no Service port matches a listener"));
    }

    let ingresses = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default();

    if !ingresses.is_empty() {
        for ingress in &ingresses {
            let (addr, is_hostname) = match (ingress.ip.as_deref(), ingress.hostname.as_deref()) {
                (Some(ip), _) if !ip.is_empty() => (ip.to_string(), false),
                (_, Some(host)) if !host.is_empty() => (host.to_string(), true),
                _ => continue,
            };

            let port = match ingress.ports.as_deref() {
                Some(statuses) if !statuses.is_empty() => statuses
                    .iter()
                    .filter(|ps| ps.error.is_none())
                    .find(|ps| {
                        candidates
                            .iter()
                            .any(|sp| sp.port == ps.port && port_protocol(sp) == ps.protocol)
                    })
                    .map(|ps| ps.port),
                _ => candidates.first().map(|sp| sp.port),
            };

            if let Some(port) = port {
                debug!("Gateway {} public address {}:{} (load balancer)", key, addr, port);
                return Ok(PublicAddress {
                    addr,
                    port,
                    source: AddressSource::LoadBalancer,
                    is_hostname,
                });
            }
        }
        return Err(not_found("no load-balancer ingress matches a listener port"));
    }

    let nodes = snapshot.nodes.list();
    let addr = first_node_address(&nodes).ok_or_else(|| not_found("no node address"))?;
    let port = candidates
        .iter()
        .find_map(|sp| sp.node_port)
        .ok_or_else(|| not_found("no node port allocated"))?;

    debug!("Gateway {} public address {}:{} (node port)", key, addr, port);
    Ok(PublicAddress {
        addr,
        port,
        source: AddressSource::NodePort,
        is_hostname: false,
    })
}

/// Public port clients use for `listener`
///
/// In node-port mode every listener has its own node port; behind a load
/// balancer the listener port is exposed as is.
pub fn public_port_for(
    listener: &ListenerState,
    address: &PublicAddress,
    service: Option<&Service>,
) -> Option<u16> {
    match address.source {
        AddressSource::LoadBalancer => listener.port_u16(),
        AddressSource::NodePort => {
            let class = listener.class()?;
            service?
                .spec
                .as_ref()?
                .ports
                .as_ref()?
                .iter()
                .find(|sp| sp.port == listener.port && port_protocol(sp) == class.service_protocol())
                .and_then(|sp| sp.node_port)
                .and_then(|p| u16::try_from(p).ok())
        }
    }
}
