//! Domain model for scopewatch
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern (a `TaskId` is never a `ScopeId`)
//! - Handles issued explicitly instead of derived from memory addresses
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{IdAllocator, ScopeId, TaskId};

pub use errors::{QueryError, ServerError, TreeError};
