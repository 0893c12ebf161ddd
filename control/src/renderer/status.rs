//! Status conditions
//!
//! Conditions are kept as an ordered sequence keyed by [`ConditionType`].
//! Setting a condition replaces an existing one of the same type in place,
//! so repeated evaluation never accumulates history.

use crate::apis::status::{Condition, ConditionStatus, ConditionType};

/// Gateway API reason strings used by the operator
pub mod reason {
    pub const ACCEPTED: &str = "Accepted";
    pub const PROGRAMMED: &str = "Programmed";
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    pub const NO_CONFLICTS: &str = "NoConflicts";
    pub const PROTOCOL_CONFLICT: &str = "ProtocolConflict";
    pub const PORT_UNAVAILABLE: &str = "PortUnavailable";
    pub const UNSUPPORTED_PROTOCOL: &str = "UnsupportedProtocol";
    pub const INVALID_ROUTE_KINDS: &str = "InvalidRouteKinds";
    pub const ADDRESS_NOT_ASSIGNED: &str = "AddressNotAssigned";
    pub const INVALID: &str = "Invalid";
    pub const PENDING: &str = "Pending";
    pub const INVALID_PARAMETERS: &str = "InvalidParameters";
    pub const NO_MATCHING_PARENT: &str = "NoMatchingParent";
    pub const NOT_ALLOWED_BY_LISTENERS: &str = "NotAllowedByListeners";
    pub const BACKEND_NOT_FOUND: &str = "BackendNotFound";
    pub const INVALID_KIND: &str = "InvalidKind";
}

/// Ordered, type-unique set of conditions for one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    generation: Option<i64>,
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Empty set reporting on an object at `generation`
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            generation,
            conditions: Vec::new(),
        }
    }

    /// Set a condition, replacing any previous one of the same type
    pub fn set(
        &mut self,
        type_: ConditionType,
        status: bool,
        reason: &str,
        message: impl Into<String>,
    ) -> &mut Self {
        let condition = Condition {
            type_,
            status: ConditionStatus::from(status),
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: self.generation,
            last_transition_time: None,
        };

        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
        self
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    pub fn reason(&self, type_: ConditionType) -> Option<&str> {
        self.get(type_).map(|c| c.reason.as_str())
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn into_vec(self) -> Vec<Condition> {
        self.conditions
    }
}
