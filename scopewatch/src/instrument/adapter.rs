//! Hook adapter feeding the inspector
//!
//! Translates [`Instrument`] callbacks into [`TreeEvent`]s. Each callback
//! body runs under `catch_unwind`: a failure is logged and counted and the
//! scheduler carries on.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::{Instrument, TaskInfo};
use crate::domain::{ScopeId, TaskId};
use crate::inspector::Inspector;
use crate::stack::SuspensionHandle;
use crate::tree::TreeEvent;

// =============================================================================
// COUNTERS
// =============================================================================

/// Hook activity counters, updated lock-free from the scheduler thread
#[derive(Debug, Default)]
pub struct HookCounters {
    spawned: AtomicU64,
    exited: AtomicU64,
    steps: AtomicU64,
    io_waits: AtomicU64,
    failures: AtomicU64,
}

/// Plain copy of [`HookCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookCountersSnapshot {
    pub spawned: u64,
    pub exited: u64,
    pub steps: u64,
    pub io_waits: u64,
    /// Hook bodies that panicked
    pub failures: u64,
}

impl HookCounters {
    pub fn snapshot(&self) -> HookCountersSnapshot {
        HookCountersSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            exited: self.exited.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            io_waits: self.io_waits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for HookCountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} spawned, {} exited, {} steps, {} I/O waits, {} hook failures",
            self.spawned, self.exited, self.steps, self.io_waits, self.failures
        )
    }
}

// =============================================================================
// ADAPTER
// =============================================================================

/// The inspector's [`Instrument`] implementation
///
/// Obtain one with [`Inspector::hooks`] and register it with the scheduler.
#[derive(Debug)]
pub struct HookAdapter {
    inspector: Arc<Inspector>,
    counters: HookCounters,
    origin: Instant,
    /// Nanoseconds since `origin` when the current I/O wait began
    io_wait_started: AtomicU64,
}

impl HookAdapter {
    pub(crate) fn new(inspector: Arc<Inspector>) -> Self {
        Self {
            inspector,
            counters: HookCounters::default(),
            origin: Instant::now(),
            io_wait_started: AtomicU64::new(0),
        }
    }

    pub fn counters(&self) -> HookCountersSnapshot {
        self.counters.snapshot()
    }

    fn guarded(&self, hook: &'static str, body: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
            HookCounters::bump(&self.counters.failures);
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            warn!("Hook {hook} failed: {reason}");
        }
    }

    #[allow(clippy::cast_possible_truncation)] // u64 nanos cover ~584 years of uptime
    fn elapsed_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Instrument for HookAdapter {
    fn before_run(&self) {
        self.guarded("before_run", || info!("Scheduler run started"));
    }

    fn after_run(&self) {
        self.guarded("after_run", || {
            info!("Scheduler run finished: {}", self.counters.snapshot());
        });
    }

    fn task_spawned(&self, task: &TaskInfo) {
        self.guarded("task_spawned", || {
            HookCounters::bump(&self.counters.spawned);
            debug!("New task spawned: {} ({})", task.name, task.id);
            self.inspector.publish(TreeEvent::TaskSpawned {
                id: task.id,
                name: task.name.clone(),
                parent: task.parent,
            });
        });
    }

    fn task_scheduled(&self, task: TaskId) {
        self.guarded("task_scheduled", || trace!("Task scheduled: {task}"));
    }

    fn before_task_step(&self, task: TaskId) {
        self.guarded("before_task_step", || {
            trace!("Running step of {task}");
            self.inspector.publish(TreeEvent::SuspensionChanged { id: task, suspension: None });
        });
    }

    fn after_task_step(&self, task: TaskId, suspended: Option<&SuspensionHandle>) {
        self.guarded("after_task_step", || {
            HookCounters::bump(&self.counters.steps);
            trace!("Finished step of {task}");
            if suspended.is_some() {
                let suspension = suspended.cloned();
                self.inspector.publish(TreeEvent::SuspensionChanged { id: task, suspension });
            }
        });
    }

    fn task_exited(&self, task: TaskId) {
        self.guarded("task_exited", || {
            HookCounters::bump(&self.counters.exited);
            debug!("Task exited: {task}");
            self.inspector.publish(TreeEvent::TaskExited { id: task });
        });
    }

    fn scope_opened(&self, scope: ScopeId, parent: TaskId) {
        self.guarded("scope_opened", || {
            debug!("{scope} opened in {parent}");
            self.inspector.publish(TreeEvent::ScopeOpened { id: scope, parent });
        });
    }

    fn scope_closed(&self, scope: ScopeId) {
        self.guarded("scope_closed", || {
            debug!("{scope} closing");
            self.inspector.publish(TreeEvent::ScopeClosed { id: scope });
        });
    }

    fn before_io_wait(&self, timeout: Duration) {
        self.guarded("before_io_wait", || {
            HookCounters::bump(&self.counters.io_waits);
            self.io_wait_started.store(self.elapsed_nanos(), Ordering::Relaxed);
            if timeout.is_zero() {
                trace!("Doing a quick check for I/O");
            } else {
                trace!("Waiting for I/O for up to {timeout:?}");
            }
        });
    }

    fn after_io_wait(&self, _timeout: Duration) {
        self.guarded("after_io_wait", || {
            let started = self.io_wait_started.load(Ordering::Relaxed);
            let took = Duration::from_nanos(self.elapsed_nanos().saturating_sub(started));
            trace!("Finished I/O check (took {took:?})");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::CoroutineFrame;
    use crate::tree::TaskTree;

    fn setup() -> (Arc<Inspector>, HookAdapter) {
        let inspector = Arc::new(Inspector::new());
        let hooks = inspector.hooks();
        (inspector, hooks)
    }

    #[test]
    fn test_spawn_and_scope_hooks_build_tree() {
        let (inspector, hooks) = setup();
        hooks.task_spawned(&TaskInfo::new(TaskId(1), "main", None));
        hooks.scope_opened(ScopeId(2), TaskId(1));
        hooks.task_spawned(&TaskInfo::new(TaskId(3), "child", Some(ScopeId(2))));

        let (tasks, scopes) = inspector.with_tree(|t| (t.task_count(), t.scope_count()));
        assert_eq!((tasks, scopes), (2, 1));
        assert_eq!(hooks.counters().spawned, 2);
    }

    #[test]
    fn test_step_hooks_track_suspension() {
        let (inspector, hooks) = setup();
        hooks.task_spawned(&TaskInfo::new(TaskId(1), "main", None));

        let chain = CoroutineFrame::parked("main", None);
        hooks.before_task_step(TaskId(1));
        hooks.after_task_step(TaskId(1), Some(&chain));
        let parked = inspector
            .with_tree(|t| t.find_task_by_id(TaskId(1)).and_then(|n| n.suspension().cloned()));
        assert!(parked.is_some_and(|h| Arc::ptr_eq(&h, &chain)));

        hooks.before_task_step(TaskId(1));
        let running = inspector
            .with_tree(|t| t.find_task_by_id(TaskId(1)).map(|n| n.suspension().is_none()));
        assert_eq!(running, Some(true));
        assert_eq!(hooks.counters().steps, 1);
    }

    #[test]
    fn test_exit_hook_detaches_task() {
        let (inspector, hooks) = setup();
        hooks.task_spawned(&TaskInfo::new(TaskId(1), "main", None));
        hooks.scope_opened(ScopeId(2), TaskId(1));
        hooks.task_spawned(&TaskInfo::new(TaskId(3), "child", Some(ScopeId(2))));
        hooks.task_exited(TaskId(3));

        assert!(inspector.with_tree(|t| t.find_task_by_id(TaskId(3)).is_none()));
        assert_eq!(hooks.counters().exited, 1);
    }

    #[test]
    fn test_io_wait_hooks_are_counted() {
        let (_inspector, hooks) = setup();
        hooks.before_io_wait(Duration::ZERO);
        hooks.after_io_wait(Duration::ZERO);
        hooks.before_io_wait(Duration::from_millis(5));
        hooks.after_io_wait(Duration::from_millis(5));
        assert_eq!(hooks.counters().io_waits, 2);
    }

    #[test]
    fn test_panicking_body_is_contained() {
        let (inspector, hooks) = setup();
        hooks.guarded("test", || panic!("boom"));
        hooks.guarded("test", || std::panic::panic_any(42_u32));
        assert_eq!(hooks.counters().failures, 2);

        // Hooks keep working afterwards
        hooks.task_spawned(&TaskInfo::new(TaskId(1), "main", None));
        assert_eq!(inspector.with_tree(TaskTree::task_count), 1);
    }

    #[test]
    fn test_counters_display() {
        let snapshot =
            HookCountersSnapshot { spawned: 3, exited: 1, steps: 10, io_waits: 4, failures: 0 };
        assert_eq!(
            snapshot.to_string(),
            "3 spawned, 1 exited, 10 steps, 4 I/O waits, 0 hook failures"
        );
    }
}
