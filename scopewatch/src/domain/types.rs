//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent passing a scope handle where a task handle
//! is expected, and make the hook signatures self-describing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Task handle
///
/// Issued once at spawn time by an [`IdAllocator`] and never reused for the
/// life of the process. Not stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

/// Scope-group (nursery) handle
///
/// Same uniqueness rules as [`TaskId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope#{}", self.0)
    }
}

/// Monotonic handle source owned by whoever runs the scheduler
///
/// Tasks and scopes draw from one counter, so a raw number in a URL names at
/// most one node of either kind.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Issue a fresh task handle
    pub fn next_task(&self) -> TaskId {
        TaskId(self.bump())
    }

    /// Issue a fresh scope handle
    pub fn next_scope(&self) -> ScopeId {
        ScopeId(self.bump())
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(5).to_string(), "Task#5");
        assert_eq!(ScopeId(7).to_string(), "Scope#7");
    }

    #[test]
    fn test_allocator_is_monotonic_across_kinds() {
        let ids = IdAllocator::new();
        let a = ids.next_task();
        let b = ids.next_scope();
        let c = ids.next_task();

        assert_eq!(a, TaskId(1));
        assert_eq!(b, ScopeId(2));
        assert_eq!(c, TaskId(3));
    }

    #[test]
    fn test_allocator_never_repeats() {
        let ids = IdAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(ids.next_task()));
        }
    }
}
