//! Error types for node-group resolution.

use std::time::Duration;

use thiserror::Error;

use machinescale_state::{ResourceKind, StateError};

/// Result type alias for resolver operations.
pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

/// Faults in a single group's annotations. These exclude that group from
/// the catalog and never abort enumeration of the others.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("missing annotation {key}")]
    MissingBound { key: String },

    #[error("invalid annotation {key}={value:?}: {reason}")]
    InvalidBoundValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid annotation {key}={value:?}: {source}")]
    InvalidCapacityValue {
        key: String,
        value: String,
        #[source]
        source: QuantityError,
    },
}

/// A string that is not a valid resource quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("unable to parse quantity {0:?}")]
    Format(String),

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Errors returned by the resolver and the node-group manager.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    /// The cache is unreadable or internally inconsistent.
    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("failed to build node group {group}: {source}")]
    InvalidGroup {
        group: String,
        #[source]
        source: AnnotationError,
    },

    /// An owner reference names an object that is missing from the cache
    /// or whose uid does not match.
    #[error("unknown {kind} {key:?}")]
    DanglingReference { kind: ResourceKind, key: String },

    #[error("timed out after {0:?} waiting for in-flight node group refresh")]
    RefreshTimeout(Duration),
}

impl AutoscaleError {
    /// True for cache-level faults that must abort the current call.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(self, AutoscaleError::State(e) if e.is_consistency_fault())
    }
}
