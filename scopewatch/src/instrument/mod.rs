//! # Scheduler Instrumentation
//!
//! The contract between a cooperative scheduler and anything observing it.
//! The scheduler calls these hooks synchronously on its own thread, so every
//! implementation must return quickly, never block, and never panic out.
//!
//! Every hook has a no-op default; implementors override what they need.

mod adapter;

use std::time::Duration;

pub use adapter::{HookAdapter, HookCounters, HookCountersSnapshot};

use crate::domain::{ScopeId, TaskId};
use crate::stack::SuspensionHandle;

/// Identity of a freshly spawned task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    /// Scope the task was spawned into; `None` for the root task
    pub parent: Option<ScopeId>,
}

impl TaskInfo {
    pub fn new(id: TaskId, name: impl Into<String>, parent: Option<ScopeId>) -> Self {
        Self { id, name: name.into(), parent }
    }
}

/// Scheduler lifecycle callbacks
#[allow(unused_variables)]
pub trait Instrument: Send + Sync {
    fn before_run(&self) {}

    fn after_run(&self) {}

    fn task_spawned(&self, task: &TaskInfo) {}

    fn task_scheduled(&self, task: TaskId) {}

    fn before_task_step(&self, task: TaskId) {}

    /// `suspended` is the head of the task's chain when it parked, `None` if
    /// the step ended without a resumable frame (e.g. the task finished).
    fn after_task_step(&self, task: TaskId, suspended: Option<&SuspensionHandle>) {}

    fn task_exited(&self, task: TaskId) {}

    fn scope_opened(&self, scope: ScopeId, parent: TaskId) {}

    fn scope_closed(&self, scope: ScopeId) {}

    /// A zero timeout means a non-blocking readiness check
    fn before_io_wait(&self, timeout: Duration) {}

    fn after_io_wait(&self, timeout: Duration) {}
}
