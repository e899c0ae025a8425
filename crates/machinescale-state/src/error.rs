//! Error types for the resource cache.

use thiserror::Error;

use crate::types::ResourceKind;

/// Result type alias for resource cache operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or updating the resource cache.
#[derive(Debug, Error)]
pub enum StateError {
    /// A writer panicked while holding the cache lock; the tables can no
    /// longer be trusted.
    #[error("resource cache lock poisoned")]
    Poisoned,

    /// An index that must be unique returned more than one object.
    #[error("internal error; index {index} key {key:?}: expected len<=1, got {count}")]
    DuplicateIndexEntry {
        index: &'static str,
        key: String,
        count: usize,
    },

    #[error("initial cache sync aborted; still waiting on {pending:?}")]
    SyncAborted { pending: Vec<ResourceKind> },

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
}

impl StateError {
    /// True for faults that indicate the cache itself is inconsistent or
    /// unreadable, as opposed to bad input.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            StateError::Poisoned | StateError::DuplicateIndexEntry { .. }
        )
    }
}
