//! Domain error model.

use thiserror::Error;

use crate::record::ExecutionState;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (parsing, state machine rules).
/// Storage and network concerns belong to the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A state name did not match any known execution state.
    #[error("unknown execution state: {0}")]
    UnknownState(String),

    /// The execution record state machine rejected a transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown_state(msg: impl Into<String>) -> Self {
        Self::UnknownState(msg.into())
    }

    pub fn invalid_transition(from: ExecutionState, to: ExecutionState) -> Self {
        Self::InvalidTransition { from, to }
    }
}
