//! Listener conflict resolution
//!
//! Computes per-listener acceptance for a Gateway. Listeners are grouped by
//! port; within a group the lowest declaration index wins and every later
//! listener is rejected with `PortUnavailable` / `ProtocolConflict`.
//!
//! Without mixed-protocol support a load balancer cannot expose UDP and TCP
//! on the same port, so any port reuse conflicts. With it, only listeners of
//! the same protocol class conflict.

use crate::apis::status::{ConditionType, ListenerStatus, RouteGroupKind};
use crate::apis::Gateway;
use crate::error::NonCriticalError;
use crate::renderer::status::{reason, ConditionSet};
use common::{ListenerProtocol, ProtocolClass};
use tracing::debug;

/// Route kinds listeners accept
pub fn supported_kinds() -> Vec<RouteGroupKind> {
    vec![RouteGroupKind {
        group: crate::apis::gateway_config::TURNGATE_GROUP.to_string(),
        kind: "UDPRoute".to_string(),
    }]
}

/// Resolved state of one declared listener
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerState {
    pub name: String,
    pub port: i32,
    /// `None` for unsupported protocol strings
    pub protocol: Option<ListenerProtocol>,
    pub accepted: bool,
    pub conflicted: bool,
    pub attached_routes: i32,
    pub conditions: ConditionSet,
}

impl ListenerState {
    /// Validated port, only meaningful for accepted listeners
    pub fn port_u16(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|p| *p != 0)
    }

    pub fn class(&self) -> Option<ProtocolClass> {
        self.protocol.map(|p| p.class())
    }

    /// Record whether the relay for this listener is servable
    pub fn set_programmed(&mut self, has_address: bool) {
        let (status, why, message) = match (self.accepted, has_address) {
            (true, true) => (true, reason::PROGRAMMED, "Listener is programmed"),
            (true, false) => (false, reason::PENDING, "Waiting for a public address"),
            (false, _) => (false, reason::INVALID, "Listener is not accepted"),
        };
        self.conditions
            .set(ConditionType::Programmed, status, why, message);
    }

    /// Mark the listener invalid as part of gateway invalidation
    pub fn set_invalid(&mut self, message: &str) {
        self.conditions
            .set(ConditionType::Programmed, false, reason::INVALID, message);
    }

    pub fn set_unresolved_refs(&mut self, message: impl Into<String>) {
        self.conditions.set(
            ConditionType::ResolvedRefs,
            false,
            reason::INVALID_ROUTE_KINDS,
            message,
        );
    }

    pub fn to_status(&self) -> ListenerStatus {
        ListenerStatus {
            name: self.name.clone(),
            attached_routes: self.attached_routes,
            supported_kinds: supported_kinds(),
            conditions: self.conditions.iter().cloned().collect(),
        }
    }
}

/// Listener states of one Gateway, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerResolution {
    pub listeners: Vec<ListenerState>,
    pub findings: Vec<NonCriticalError>,
}

impl ListenerResolution {
    pub fn accepted(&self) -> impl Iterator<Item = &ListenerState> {
        self.listeners.iter().filter(|l| l.accepted)
    }

    pub fn has_accepted(&self) -> bool {
        self.listeners.iter().any(|l| l.accepted)
    }

    pub fn get(&self, name: &str) -> Option<&ListenerState> {
        self.listeners.iter().find(|l| l.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ListenerState> {
        self.listeners.iter_mut().find(|l| l.name == name)
    }

    pub fn statuses(&self) -> Vec<ListenerStatus> {
        self.listeners.iter().map(ListenerState::to_status).collect()
    }
}

/// Resolve acceptance and conflicts for every listener of `gateway`
pub fn resolve_listeners(gateway: &Gateway, mixed_protocol: bool) -> ListenerResolution {
    let generation = gateway.metadata.generation;
    let mut resolution = ListenerResolution::default();
    // (port, class) of accepted listeners, in declaration order
    let mut taken: Vec<(u16, ProtocolClass)> = Vec::new();

    for listener in &gateway.spec.listeners {
        let mut conditions = ConditionSet::new(generation);
        let mut state = ListenerState {
            name: listener.name.clone(),
            port: listener.port,
            protocol: None,
            accepted: false,
            conflicted: false,
            attached_routes: 0,
            conditions: ConditionSet::default(),
        };

        let protocol = listener.protocol.parse::<ListenerProtocol>().ok();
        let port = u16::try_from(listener.port).ok().filter(|p| *p != 0);

        match (protocol, port) {
            (None, _) => {
                conditions.set(
                    ConditionType::Accepted,
                    false,
                    reason::UNSUPPORTED_PROTOCOL,
                    format!("Unsupported protocol: {}", listener.protocol),
                );
                resolution.findings.push(NonCriticalError::InvalidProtocol(format!(
                    "{}: {}",
                    listener.name, listener.protocol
                )));
            }
            (Some(protocol), None) => {
                state.protocol = Some(protocol);
                conditions.set(
                    ConditionType::Accepted,
                    false,
                    reason::PORT_UNAVAILABLE,
                    format!("Invalid port: {}", listener.port),
                );
                resolution
                    .findings
                    .push(NonCriticalError::PortUnavailable(listener.name.clone()));
            }
            (Some(protocol), Some(port)) => {
                state.protocol = Some(protocol);
                let class = protocol.class();
                let conflict = taken
                    .iter()
                    .any(|(p, c)| *p == port && (*c == class || !mixed_protocol));

                if conflict {
                    debug!(
                        "Listener {} port {}/{} conflicts with an earlier listener",
                        listener.name, port, class
                    );
                    state.conflicted = true;
                    conditions.set(
                        ConditionType::Accepted,
                        false,
                        reason::PORT_UNAVAILABLE,
                        format!("Port {} is already in use", port),
                    );
                    resolution
                        .findings
                        .push(NonCriticalError::PortUnavailable(listener.name.clone()));
                } else {
                    taken.push((port, class));
                    state.accepted = true;
                    conditions.set(
                        ConditionType::Accepted,
                        true,
                        reason::ACCEPTED,
                        "Listener is accepted",
                    );
                }
            }
        }

        conditions.set(
            ConditionType::Programmed,
            false,
            reason::PENDING,
            "Listener is not yet programmed",
        );
        conditions.set(
            ConditionType::ResolvedRefs,
            true,
            reason::RESOLVED_REFS,
            "All references resolved",
        );
        if state.conflicted {
            conditions.set(
                ConditionType::Conflicted,
                true,
                reason::PROTOCOL_CONFLICT,
                "Listener port conflicts with an earlier listener",
            );
        } else {
            conditions.set(
                ConditionType::Conflicted,
                false,
                reason::NO_CONFLICTS,
                "No conflicts",
            );
        }

        state.conditions = conditions;
        resolution.listeners.push(state);
    }

    resolution
}
