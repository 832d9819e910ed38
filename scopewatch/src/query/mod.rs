//! # Query Service
//!
//! Transport-agnostic read side of the inspector. Every operation takes the
//! tree lock at most once, copies what it needs, and does the expensive work
//! (serialization, source-line reads) after releasing it.

use std::sync::Arc;

use log::warn;

use crate::domain::{QueryError, ScopeId, TaskId, TreeError};
use crate::inspector::Inspector;
use crate::stack::{StackExtractor, StackFrame};
use crate::stats::{current_stats, StatisticsSource, StatsSnapshot};
use crate::tree::TreeView;

pub struct QueryService {
    inspector: Arc<Inspector>,
    stats: Arc<dyn StatisticsSource>,
    extractor: StackExtractor,
}

impl QueryService {
    pub fn new(inspector: Arc<Inspector>, stats: Arc<dyn StatisticsSource>) -> Self {
        Self { inspector, stats, extractor: StackExtractor::new() }
    }

    /// Point-in-time copy of the whole task/scope hierarchy
    ///
    /// # Errors
    /// `NoRootFound` before the scheduler has reported its root task.
    pub fn get_task_tree(&self) -> Result<TreeView, QueryError> {
        self.inspector.with_tree(|tree| tree.snapshot()).map_err(|e| {
            if e != TreeError::NoRootFound {
                warn!("Task tree inconsistent: {e}");
            }
            QueryError::NoRootFound
        })
    }

    /// Logical call stack of a live task, outermost frame first
    ///
    /// # Errors
    /// `NotFound` for ids not reachable from the root, `NoStackAvailable`
    /// while the task is running or has never parked.
    pub fn get_task_stacktrace(&self, id: TaskId) -> Result<Vec<StackFrame>, QueryError> {
        // Chains are immutable once published; walk a clone outside the lock
        let suspension = self.inspector.with_tree(|tree| {
            tree.find_task_by_id(id)
                .map(|task| task.suspension().cloned())
                .ok_or_else(|| QueryError::task_not_found(id))
        })?;

        self.extractor.extract(id, suspension.as_ref())
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        current_stats(self.stats.as_ref())
    }

    /// Ask a live scope to cancel
    ///
    /// # Errors
    /// `NotFound` for unknown scopes; `NotImplemented` otherwise, as
    /// cancellation is not wired to the scheduler.
    pub fn request_scope_cancel(&self, id: ScopeId) -> Result<(), QueryError> {
        let known = self.inspector.with_tree(|tree| tree.find_scope_by_id(id).is_some());
        if !known {
            return Err(QueryError::scope_not_found(id));
        }
        Err(QueryError::NotImplemented("scope cancellation"))
    }
}
