//! Structured error types for scopewatch
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{ScopeId, TaskId};
use thiserror::Error;

/// Failures surfaced to query callers
///
/// The transport maps each variant to a status code; see `server`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} has no suspended computation to walk")]
    NoStackAvailable(TaskId),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("No root task yet (scheduler not started)")]
    NoRootFound,
}

impl QueryError {
    pub fn task_not_found(id: TaskId) -> Self {
        QueryError::NotFound(id.to_string())
    }

    pub fn scope_not_found(id: ScopeId) -> Self {
        QueryError::NotFound(id.to_string())
    }
}

/// Model violations detected while applying a hook event
///
/// These never leave the hook adapter: they are logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("{0} is already in the tree")]
    DuplicateTask(TaskId),

    #[error("{0} is already in the tree")]
    DuplicateScope(ScopeId),

    #[error("Unknown task {0}")]
    UnknownTask(TaskId),

    #[error("Unknown scope {0}")]
    UnknownScope(ScopeId),

    #[error("{new} has no parent scope but {existing} is already the root")]
    SecondRoot { existing: TaskId, new: TaskId },

    #[error("Tree is empty")]
    NoRootFound,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
