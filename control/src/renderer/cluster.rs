//! Backend cluster resolution
//!
//! Turns the backend references of a UDPRoute into one relay cluster named
//! after the route. With endpoint discovery the cluster lists ready pod
//! addresses (plus the ClusterIP when relaying to it is enabled); otherwise
//! it lists the Services' cluster DNS names.

use crate::apis::udp_route::BackendRef;
use crate::apis::UDPRoute;
use crate::error::NonCriticalError;
use crate::store::{ObjectKey, StoreSnapshot};
use common::{ClusterConfig, ClusterType};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::ResourceExt;
use tracing::{debug, warn};

/// Pass-wide knobs taken from the controller config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOptions {
    pub endpoint_discovery: bool,
    pub relay_to_cluster_ip: bool,
    pub cluster_domain: String,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            endpoint_discovery: true,
            relay_to_cluster_ip: true,
            cluster_domain: "cluster.local".to_string(),
        }
    }
}

/// Result of resolving one route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterResolution {
    /// `None` when no backend could be resolved
    pub cluster: Option<ClusterConfig>,
    pub findings: Vec<NonCriticalError>,
    pub total_backends: usize,
    pub resolved_backends: usize,
}

impl ClusterResolution {
    /// Every backend resolved to an existing, well-formed Service
    pub fn all_resolved(&self) -> bool {
        self.total_backends > 0 && self.resolved_backends == self.total_backends
    }

    pub fn has_invalid_reference(&self) -> bool {
        self.findings.iter().any(NonCriticalError::is_invalid_reference)
    }
}

/// What one backend adds to the cluster
struct Contribution {
    dns_name: String,
    /// Concrete addresses; empty means DNS only
    addresses: Vec<String>,
}

fn is_core_group(group: Option<&str>) -> bool {
    matches!(group, None | Some("") | Some("core"))
}

fn is_service_kind(kind: Option<&str>) -> bool {
    matches!(kind, None | Some("Service"))
}

/// Ready addresses across all slices, in slice then endpoint order
pub fn ready_addresses(slices: &[std::sync::Arc<EndpointSlice>]) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::new();
    for slice in slices {
        for endpoint in &slice.endpoints {
            // an endpoint without conditions is ready
            let is_ready = endpoint
                .conditions
                .as_ref()
                .map_or(true, |c| c.ready.unwrap_or(true));
            if !is_ready {
                continue;
            }
            for address in &endpoint.addresses {
                if !addresses.contains(address) {
                    addresses.push(address.clone());
                }
            }
        }
    }
    addresses
}

fn resolve_backend(
    route_ns: &str,
    backend: &BackendRef,
    snapshot: &StoreSnapshot,
    options: &ClusterOptions,
    findings: &mut Vec<NonCriticalError>,
) -> Option<Contribution> {
    let namespace = backend.namespace.as_deref().unwrap_or(route_ns);
    let key = ObjectKey::new(namespace, &backend.name);

    if !is_core_group(backend.group.as_deref()) {
        findings.push(NonCriticalError::InvalidBackendGroup(format!(
            "{} (group {})",
            key,
            backend.group.as_deref().unwrap_or_default()
        )));
        return None;
    }
    if !is_service_kind(backend.kind.as_deref()) {
        findings.push(NonCriticalError::InvalidBackendKind(format!(
            "{} (kind {})",
            key,
            backend.kind.as_deref().unwrap_or_default()
        )));
        return None;
    }

    let Some(service) = snapshot.services.get(&key) else {
        findings.push(NonCriticalError::ServiceNotFound(key.to_string()));
        return None;
    };

    let dns_name = format!(
        "{}.{}.svc.{}",
        backend.name, namespace, options.cluster_domain
    );

    if !options.endpoint_discovery {
        return Some(Contribution {
            dns_name,
            addresses: Vec::new(),
        });
    }

    let slices = snapshot.endpoint_slices_for(namespace, &backend.name);
    if slices.is_empty() {
        findings.push(NonCriticalError::EndpointNotFound(key.to_string()));
    }
    let mut addresses = ready_addresses(&slices);

    if options.relay_to_cluster_ip {
        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.as_deref())
            .filter(|ip| !ip.is_empty() && *ip != "None");
        match cluster_ip {
            Some(ip) => {
                if !addresses.iter().any(|a| a == ip) {
                    addresses.push(ip.to_string());
                }
            }
            None => findings.push(NonCriticalError::ClusterIPNotFound(key.to_string())),
        }
    }

    if addresses.is_empty() {
        debug!("Backend {} has no concrete addresses, using {}", key, dns_name);
    }

    Some(Contribution {
        dns_name,
        addresses,
    })
}

/// Resolve all backends of `route` into one cluster
pub fn resolve_clusters(
    route: &UDPRoute,
    snapshot: &StoreSnapshot,
    options: &ClusterOptions,
) -> ClusterResolution {
    let route_ns = route.namespace().unwrap_or_default();
    let name = format!("{}/{}", route_ns, route.name_any());

    let mut resolution = ClusterResolution::default();
    let mut contributions = Vec::new();

    for backend in route.spec.rules.iter().flat_map(|r| r.backend_refs.iter()) {
        resolution.total_backends += 1;
        if let Some(c) = resolve_backend(&route_ns, backend, snapshot, options, &mut resolution.findings) {
            resolution.resolved_backends += 1;
            contributions.push(c);
        }
    }

    if contributions.is_empty() {
        return resolution;
    }

    let all_static = contributions.iter().all(|c| !c.addresses.is_empty());
    let all_dns = contributions.iter().all(|c| c.addresses.is_empty());

    let mut cluster = ClusterConfig {
        name: name.clone(),
        cluster_type: ClusterType::StrictDns,
        endpoints: Vec::new(),
    };

    if all_static {
        cluster.cluster_type = ClusterType::Static;
        for address in contributions.iter().flat_map(|c| c.addresses.iter()) {
            cluster.push_endpoint(address.as_str());
        }
    } else {
        if !all_dns {
            warn!(
                "Route {} mixes backends with and without endpoint addresses, using STRICT_DNS",
                name
            );
            resolution
                .findings
                .push(NonCriticalError::InconsistentClusterType(name.clone()));
        }
        for c in &contributions {
            cluster.push_endpoint(c.dns_name.as_str());
        }
    }

    resolution.cluster = Some(cluster);
    resolution
}
