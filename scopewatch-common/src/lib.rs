//! # Shared Wire Records (Server ↔ Clients)
//!
//! Defines the JSON bodies served by the scopewatch query surface. The server
//! produces them and anything reading the endpoints (the browser UI, scripts,
//! the integration tests) parses them back with the same types.
//!
//! ## Endpoints
//!
//! | Path                         | Body                |
//! |------------------------------|---------------------|
//! | `/tasks.json`                | [`TaskView`]        |
//! | `/task/{id}/stacktrace.json` | [`StacktraceView`]  |
//! | `/stats.json`                | [`StatsView`]       |
//!
//! Field names are part of the external contract; do not rename them.

use serde::{Deserialize, Serialize};

/// Display name given to every scope-group node in the tree view.
pub const SCOPE_DISPLAY_NAME: &str = "<nursery>";

// ============================================================================
// Task Tree
// ============================================================================

/// A task node in `/tasks.json`
///
/// The root of the document is always a task. Children are the scope-groups
/// opened inside the task body, in the order they were opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: u64,
    pub name: String,
    pub scopes: Vec<ScopeView>,
}

/// A scope-group node in `/tasks.json`
///
/// Children are the tasks spawned into the scope, in spawn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeView {
    pub id: u64,
    pub name: String,
    pub tasks: Vec<TaskView>,
}

impl TaskView {
    /// Count task and scope nodes below (and including) this task
    ///
    /// Returns `(tasks, scopes)`. Walks with an explicit stack.
    #[must_use]
    pub fn count_nodes(&self) -> (usize, usize) {
        let mut tasks = 0;
        let mut scopes = 0;
        let mut pending: Vec<&TaskView> = vec![self];

        while let Some(task) = pending.pop() {
            tasks += 1;
            for scope in &task.scopes {
                scopes += 1;
                pending.extend(scope.tasks.iter());
            }
        }

        (tasks, scopes)
    }
}

// Derived drop glue recurses once per nesting level; unlink children onto
// explicit stacks instead.
impl Drop for TaskView {
    fn drop(&mut self) {
        drop_nested(std::mem::take(&mut self.scopes), Vec::new());
    }
}

impl Drop for ScopeView {
    fn drop(&mut self) {
        drop_nested(Vec::new(), std::mem::take(&mut self.tasks));
    }
}

/// Each popped node is dropped with its children already moved out
fn drop_nested(mut scopes: Vec<ScopeView>, mut tasks: Vec<TaskView>) {
    while !scopes.is_empty() || !tasks.is_empty() {
        while let Some(mut scope) = scopes.pop() {
            tasks.append(&mut scope.tasks);
        }
        while let Some(mut task) = tasks.pop() {
            scopes.append(&mut task.scopes);
        }
    }
}

// ============================================================================
// Stack Traces
// ============================================================================

/// One frame of `/task/{id}/stacktrace.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameView {
    /// 1-based line number of the suspension point
    pub lineno: u32,
    /// Source text of that line, `null` when the file is unreadable
    pub line: Option<String>,
    pub filename: String,
    /// Function (or combinator) name
    pub name: String,
}

/// Body of `/task/{id}/stacktrace.json`
///
/// Frames run from the task's entry point (first) down to the innermost
/// point of suspension (last).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StacktraceView {
    pub stacktrace: Vec<FrameView>,
}

// ============================================================================
// Scheduler Statistics
// ============================================================================

/// Body of `/stats.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub tasks_living: usize,
    pub tasks_runnable: usize,
    /// `null` when no task waits on a timed wake-up
    pub seconds_to_next_deadline: Option<f64>,
    pub run_sync_soon_queue_size: usize,
    pub io_statistics_backend: String,
}
