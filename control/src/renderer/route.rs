//! Route attachment and route status
//!
//! A UDPRoute attaches to a Gateway listener through one of its parent
//! references. Only accepted listeners take attachments.

use crate::apis::status::ConditionType;
use crate::apis::udp_route::{ParentReference, RouteParentStatus, UDPRouteStatus};
use crate::apis::{Gateway, UDPRoute};
use crate::renderer::cluster::ClusterResolution;
use crate::renderer::listener::{ListenerResolution, ListenerState};
use crate::renderer::metadata::gateway_key;
use crate::renderer::status::{reason, ConditionSet};
use crate::store::{ObjectKey, StoreSnapshot};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// `<namespace>/<name>` of a route
pub fn route_key(route: &UDPRoute) -> String {
    format!("{}/{}", route.namespace().unwrap_or_default(), route.name_any())
}

/// Gateway a parent reference points at, namespace defaulting to the route's
pub fn parent_gateway_key(route: &UDPRoute, parent: &ParentReference) -> ObjectKey {
    let namespace = parent
        .namespace
        .clone()
        .or_else(|| route.namespace())
        .unwrap_or_default();
    ObjectKey::new(namespace, &parent.name)
}

fn listener_matches(parent: &ParentReference, listener: &ListenerState) -> bool {
    let section_ok = parent
        .section_name
        .as_deref()
        .map_or(true, |section| section == listener.name);
    let port_ok = parent.port.map_or(true, |port| port == listener.port);
    section_ok && port_ok
}

/// Accepted listeners of `listeners` selected by `parent`
fn selected_listeners<'a>(
    parent: &'a ParentReference,
    listeners: &'a ListenerResolution,
) -> impl Iterator<Item = &'a ListenerState> + 'a {
    listeners
        .accepted()
        .filter(move |listener| listener_matches(parent, listener))
}

/// A route attached to one Gateway
#[derive(Debug, Clone)]
pub struct Attachment {
    /// `<namespace>/<name>` of the route
    pub key: String,
    pub route: Arc<UDPRoute>,
    /// Names of the listeners the route is attached to
    pub listeners: Vec<String>,
}

/// Attach `routes` to the accepted listeners of `gateway`
///
/// Bumps `attached_routes` on every listener that takes a route and
/// returns the attachments in route key order.
pub fn attach_routes(
    gateway: &Gateway,
    listeners: &mut ListenerResolution,
    routes: &[Arc<UDPRoute>],
) -> Vec<Attachment> {
    let gw_key = gateway_key(gateway);
    let mut attachments = Vec::new();

    for route in routes {
        let mut names: Vec<String> = Vec::new();
        for parent in &route.spec.parent_refs {
            if !parent.targets_gateway() || parent_gateway_key(route, parent) != gw_key {
                continue;
            }
            for listener in selected_listeners(parent, listeners) {
                if !names.contains(&listener.name) {
                    names.push(listener.name.clone());
                }
            }
        }

        if names.is_empty() {
            continue;
        }

        for name in &names {
            if let Some(listener) = listeners.get_mut(name) {
                listener.attached_routes += 1;
            }
        }
        debug!(
            "Route {} attached to gateway {} listeners {:?}",
            route_key(route),
            gw_key,
            names
        );
        attachments.push(Attachment {
            key: route_key(route),
            route: Arc::clone(route),
            listeners: names,
        });
    }

    attachments.sort_by(|a, b| a.key.cmp(&b.key));
    attachments
}

/// Sorted keys of the routes attached to `listener`
pub fn routes_for_listener(attachments: &[Attachment], listener: &str) -> Vec<String> {
    let mut keys: Vec<String> = attachments
        .iter()
        .filter(|a| a.listeners.iter().any(|l| l == listener))
        .map(|a| a.key.clone())
        .collect();
    keys.sort();
    keys
}

fn accepted_condition(parent: &ParentReference, listeners: &ListenerResolution) -> (bool, &'static str, String) {
    if selected_listeners(parent, listeners).next().is_some() {
        return (true, reason::ACCEPTED, "Route is accepted".to_string());
    }

    let named = parent.section_name.is_some() || parent.port.is_some();
    let exists = listeners
        .listeners
        .iter()
        .any(|listener| listener_matches(parent, listener));
    if named && exists {
        (
            false,
            reason::NOT_ALLOWED_BY_LISTENERS,
            "Referenced listener is not accepted".to_string(),
        )
    } else {
        (
            false,
            reason::NO_MATCHING_PARENT,
            "No accepted listener matches the parent reference".to_string(),
        )
    }
}

fn resolved_refs_condition(clusters: &ClusterResolution) -> (bool, &'static str, String) {
    if clusters.all_resolved() {
        return (
            true,
            reason::RESOLVED_REFS,
            "All backend references resolved".to_string(),
        );
    }
    if clusters.total_backends == 0 {
        return (false, reason::BACKEND_NOT_FOUND, "No backend references".to_string());
    }

    let why = if clusters.has_invalid_reference() {
        reason::INVALID_KIND
    } else {
        reason::BACKEND_NOT_FOUND
    };
    let message = clusters
        .findings
        .iter()
        .filter(|f| f.is_invalid_reference() || f.is_missing_backend())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    (false, why, message)
}

/// Status of `route` for the parents this pass is responsible for
///
/// `rendered` holds the listener states of every gateway rendered in the
/// pass. A parent naming one of them is evaluated against its listeners and
/// a parent naming a Gateway that does not exist gets `NoMatchingParent`.
/// Parents naming any other Gateway belong to another controller or class,
/// so their entry in the route's current status is carried over unchanged:
/// the status is written as a whole and would otherwise drop them. Entries
/// for parents no longer listed in the spec are dropped. Returns `None`
/// when no parent is ours.
pub fn route_status(
    route: &UDPRoute,
    snapshot: &StoreSnapshot,
    rendered: &BTreeMap<ObjectKey, ListenerResolution>,
    clusters: &ClusterResolution,
    controller_name: &str,
) -> Option<UDPRouteStatus> {
    let generation = route.metadata.generation;
    let (refs_ok, refs_reason, refs_message) = resolved_refs_condition(clusters);
    let previous = route
        .status
        .as_ref()
        .map(|s| s.parents.as_slice())
        .unwrap_or_default();
    let mut parents = Vec::new();
    let mut evaluated = 0;

    for parent in &route.spec.parent_refs {
        if !parent.targets_gateway() {
            continue;
        }
        let key = parent_gateway_key(route, parent);

        let (accepted, why, message) = match rendered.get(&key) {
            Some(listeners) => accepted_condition(parent, listeners),
            None if snapshot.gateways.get(&key).is_none() => (
                false,
                reason::NO_MATCHING_PARENT,
                format!("Gateway {} not found", key),
            ),
            None => {
                if let Some(entry) = previous.iter().find(|p| &p.parent_ref == parent) {
                    parents.push(entry.clone());
                }
                continue;
            }
        };
        evaluated += 1;

        let mut conditions = ConditionSet::new(generation);
        conditions
            .set(ConditionType::Accepted, accepted, why, message)
            .set(
                ConditionType::ResolvedRefs,
                refs_ok,
                refs_reason,
                refs_message.clone(),
            );

        parents.push(RouteParentStatus {
            parent_ref: parent.clone(),
            controller_name: controller_name.to_string(),
            conditions: conditions.into_vec(),
        });
    }

    if evaluated == 0 {
        None
    } else {
        Some(UDPRouteStatus { parents })
    }
}
