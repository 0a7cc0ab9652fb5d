//! Error types for the data source.

use dataview_model::{EntityKey, ValidationError};
use std::fmt;
use thiserror::Error;

/// Result type for data source operations.
pub type DataSourceResult<T> = Result<T, DataSourceError>;

/// What the data source was doing when an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Loading,
    Submitting,
    Deferring,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => f.write_str("a load is in progress"),
            Self::Submitting => f.write_str("a submit is in progress"),
            Self::Deferring => f.write_str("loads are deferred"),
        }
    }
}

/// Failures reported by a query or submit executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The request never reached the server.
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected or failed the request.
    #[error("server error: {0}")]
    Server(String),

    /// The query name or its parameters are not valid on the server.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The submit conflicted with server state for these entities.
    #[error("submit conflicted on {} entities", .0.len())]
    Conflict(Vec<EntityKey>),
}

/// Errors returned by data source operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataSourceError {
    /// The operation conflicts with one already in flight.
    #[error("{operation} is not allowed while {activity}")]
    Reentrancy {
        operation: &'static str,
        activity: Activity,
    },

    /// Query state failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A load failed and no listener marked the failure handled.
    #[error("load failed: {0}")]
    Load(ExecutorError),

    /// A submit failed and no listener marked the failure handled.
    #[error("submit failed: {0}")]
    Submit(ExecutorError),

    /// The entity is not tracked by the data source.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityKey),

    /// The operation does not apply in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl DataSourceError {
    /// Returns whether this is a reentrancy rejection.
    pub fn is_reentrancy(&self) -> bool {
        matches!(self, Self::Reentrancy { .. })
    }
}
