use crate::domain::{ScopeId, TaskId};
use crate::stack::SuspensionHandle;

/// A single mutation of the task/scope tree, as reported by the scheduler
///
/// Hooks turn callbacks into these and queue them; whoever holds the tree
/// lock applies them in order.
#[derive(Debug, Clone)]
pub enum TreeEvent {
    TaskSpawned { id: TaskId, name: String, parent: Option<ScopeId> },
    ScopeOpened { id: ScopeId, parent: TaskId },
    ScopeClosed { id: ScopeId },
    /// `None` clears the handle (the task is running a step)
    SuspensionChanged { id: TaskId, suspension: Option<SuspensionHandle> },
    TaskExited { id: TaskId },
}

impl TreeEvent {
    /// Short label for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TreeEvent::TaskSpawned { .. } => "task_spawned",
            TreeEvent::ScopeOpened { .. } => "scope_opened",
            TreeEvent::ScopeClosed { .. } => "scope_closed",
            TreeEvent::SuspensionChanged { .. } => "suspension_changed",
            TreeEvent::TaskExited { .. } => "task_exited",
        }
    }
}
