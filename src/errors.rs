// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for address leasing and provider association
//!
//! Every failure the core can report is one variant of [`AddressError`].
//! Callers branch on the variant rather than on message text:
//!
//! | Variant | Meaning | Side effects |
//! |---|---|---|
//! | `InsufficientCapacity` | nothing matched the constraints | none |
//! | `ResourceAllocation` | quota exceeded / invalid pod or zone | none |
//! | `Concurrency` | a lock could not be acquired | none |
//! | `ProviderUnavailable` | a network element failed to program its device | depends on `continue_on_error` |
//! | `InvariantViolation` | configuration or logic defect, never repaired | call aborted |

use std::fmt;

use thiserror::Error;

use crate::domain::{PodId, Provider, ZoneId};
use crate::state_machine::TransitionError;

/// Scope an insufficient-capacity failure is reported against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapacityScope {
    /// A specific pod was requested
    Pod(PodId),
    /// Zone-wide search
    Zone(ZoneId),
    /// Region-wide portable pool
    Region,
}

impl fmt::Display for CapacityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityScope::Pod(id) => write!(f, "pod {}", id),
            CapacityScope::Zone(id) => write!(f, "zone {}", id),
            CapacityScope::Region => write!(f, "region"),
        }
    }
}

/// Errors that can occur in address management operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No address matches the requested constraints
    #[error("Insufficient address capacity in {scope}: {detail}")]
    InsufficientCapacity { scope: CapacityScope, detail: String },

    /// Quota exceeded or invalid pod/zone input
    #[error("Resource allocation error: {0}")]
    ResourceAllocation(String),

    /// A required lock could not be acquired
    #[error("Concurrent operation failed: {0}")]
    Concurrency(String),

    /// A network element failed to program its device
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: Provider, reason: String },

    /// Configuration or logic defect; never silently repaired
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Referenced entity does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Caller supplied an unusable parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Address state machine rejected a transition
    #[error("State transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Messaging layer error
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for address management operations
pub type AddressResult<T> = Result<T, AddressError>;

impl AddressError {
    /// Build a [`AddressError::NotFound`] for the given entity kind
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        AddressError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Capacity failure scoped to the pod when one was requested, else the zone
    pub fn capacity(zone: ZoneId, pod: Option<PodId>, detail: impl Into<String>) -> Self {
        let scope = match pod {
            Some(pod) => CapacityScope::Pod(pod),
            None => CapacityScope::Zone(zone),
        };
        AddressError::InsufficientCapacity {
            scope,
            detail: detail.into(),
        }
    }

    /// True for failures that indicate a defect rather than a transient condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AddressError::InvariantViolation(_) | AddressError::Transition(_)
        )
    }

    /// True when the failure came from a provider and may be tolerated by
    /// callers that opted into `continue_on_error`
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, AddressError::ProviderUnavailable { .. })
    }
}

impl From<async_nats::Error> for AddressError {
    fn from(err: async_nats::Error) -> Self {
        AddressError::Messaging(err.to_string())
    }
}

impl From<serde_json::Error> for AddressError {
    fn from(err: serde_json::Error) -> Self {
        AddressError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_capacity_scope_prefers_pod() {
        let zone = ZoneId::from_uuid(Uuid::from_u128(1));
        let pod = PodId::from_uuid(Uuid::from_u128(2));

        let err = AddressError::capacity(zone, Some(pod), "no free address");
        assert!(matches!(
            err,
            AddressError::InsufficientCapacity {
                scope: CapacityScope::Pod(p),
                ..
            } if p == pod
        ));

        let err = AddressError::capacity(zone, None, "no free address");
        assert!(matches!(
            err,
            AddressError::InsufficientCapacity {
                scope: CapacityScope::Zone(z),
                ..
            } if z == zone
        ));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AddressError::InvariantViolation("two source NAT".into()).is_fatal());
        assert!(!AddressError::Concurrency("lock".into()).is_fatal());

        let provider_err = AddressError::ProviderUnavailable {
            provider: Provider::VIRTUAL_ROUTER,
            reason: "timeout".into(),
        };
        assert!(provider_err.is_provider_failure());
        assert!(!provider_err.is_fatal());
    }
}
