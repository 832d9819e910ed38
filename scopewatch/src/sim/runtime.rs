//! Virtual-clock cooperative scheduler
//!
//! Keeps just enough state to behave like a structured-concurrency run
//! loop from the outside: a run queue, parked tasks with optional wake-up
//! deadlines, and a clock that only moves when told to. Every transition is
//! reported to the registered instruments in the order a real scheduler
//! would report it.
//!
//! Scheduler state sits behind its own mutex so [`SimStatistics`] can be
//! read from other threads; instruments are always called with that mutex
//! released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::warn;

use crate::domain::{IdAllocator, ScopeId, TaskId};
use crate::instrument::{Instrument, TaskInfo};
use crate::stack::SuspensionHandle;
use crate::stats::{RunStatistics, StatisticsSource};

/// Name reported as the I/O statistics backend
pub const SIM_IO_BACKEND: &str = "simulated";

/// What a task did during one step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Parked on `chain`; woken by the clock after `wake_after` if set,
    /// otherwise only by an explicit [`SimRuntime::reschedule`]
    Park { chain: SuspensionHandle, wake_after: Option<Duration> },
    /// Returned from its body
    Exit,
}

#[derive(Debug)]
struct SimTask {
    runnable: bool,
    wake_at: Option<Duration>,
}

#[derive(Debug, Default)]
struct SimState {
    clock: Duration,
    tasks: HashMap<TaskId, SimTask>,
    run_queue: VecDeque<TaskId>,
}

impl SimState {
    fn statistics(&self) -> RunStatistics {
        let next_deadline = self.tasks.values().filter_map(|t| t.wake_at).min();
        RunStatistics {
            tasks_living: self.tasks.len(),
            tasks_runnable: self.run_queue.len(),
            seconds_to_next_deadline: next_deadline
                .map_or(f64::INFINITY, |at| at.saturating_sub(self.clock).as_secs_f64()),
            // No cross-thread callback queue in the simulator
            run_sync_soon_queue_size: 0,
            io_backend: SIM_IO_BACKEND.to_string(),
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Statistics handle that outlives borrows of the runtime
#[derive(Debug, Clone)]
pub struct SimStatistics {
    state: Arc<Mutex<SimState>>,
}

impl StatisticsSource for SimStatistics {
    fn statistics(&self) -> RunStatistics {
        lock(&self.state).statistics()
    }
}

#[derive(Default)]
pub struct SimRuntime {
    ids: IdAllocator,
    instruments: Vec<Arc<dyn Instrument>>,
    state: Arc<Mutex<SimState>>,
}

impl SimRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_instrument(mut self, instrument: Arc<dyn Instrument>) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub fn statistics(&self) -> SimStatistics {
        SimStatistics { state: Arc::clone(&self.state) }
    }

    pub fn now(&self) -> Duration {
        lock(&self.state).clock
    }

    pub fn is_live(&self, task: TaskId) -> bool {
        lock(&self.state).tasks.contains_key(&task)
    }

    /// Start the run with its root task
    pub fn start(&self, name: &str) -> TaskId {
        self.notify(|i| i.before_run());
        self.add_task(name, None)
    }

    /// Spawn `name` into `scope`; the task is runnable immediately
    pub fn spawn(&self, scope: ScopeId, name: &str) -> TaskId {
        self.add_task(name, Some(scope))
    }

    pub fn open_scope(&self, parent: TaskId) -> ScopeId {
        let scope = self.ids.next_scope();
        self.notify(|i| i.scope_opened(scope, parent));
        scope
    }

    /// The owner finished its body and now only waits for the scope's tasks
    pub fn close_scope(&self, scope: ScopeId) {
        self.notify(|i| i.scope_closed(scope));
    }

    /// Tasks to step in this batch, in scheduling order
    pub fn take_runnable(&self) -> Vec<TaskId> {
        let mut state = lock(&self.state);
        let batch: Vec<TaskId> = state.run_queue.drain(..).collect();
        for id in &batch {
            if let Some(task) = state.tasks.get_mut(id) {
                task.runnable = false;
            }
        }
        batch
    }

    /// Run one step of `task` that ends with `outcome`
    pub fn step(&self, task: TaskId, outcome: StepOutcome) {
        if !self.is_live(task) {
            warn!("Step requested for {task}, which is not alive");
            return;
        }

        self.notify(|i| i.before_task_step(task));
        match outcome {
            StepOutcome::Park { chain, wake_after } => {
                {
                    let mut state = lock(&self.state);
                    let now = state.clock;
                    if let Some(entry) = state.tasks.get_mut(&task) {
                        entry.wake_at = wake_after.map(|after| now + after);
                    }
                }
                self.notify(|i| i.after_task_step(task, Some(&chain)));
            }
            StepOutcome::Exit => {
                {
                    let mut state = lock(&self.state);
                    state.tasks.remove(&task);
                    state.run_queue.retain(|id| *id != task);
                }
                self.notify(|i| i.after_task_step(task, None));
                self.notify(|i| i.task_exited(task));
            }
        }
    }

    /// Make a parked task runnable again
    pub fn reschedule(&self, task: TaskId) {
        let queued = {
            let mut state = lock(&self.state);
            match state.tasks.get_mut(&task) {
                Some(entry) if !entry.runnable => {
                    entry.runnable = true;
                    entry.wake_at = None;
                    state.run_queue.push_back(task);
                    true
                }
                _ => false,
            }
        };
        if queued {
            self.notify(|i| i.task_scheduled(task));
        }
    }

    /// Wait for "I/O" for `timeout`, moving the clock and waking every task
    /// whose deadline has passed
    ///
    /// Returns the woken tasks in deadline order.
    pub fn advance(&self, timeout: Duration) -> Vec<TaskId> {
        self.notify(|i| i.before_io_wait(timeout));

        let due = {
            let mut state = lock(&self.state);
            state.clock += timeout;
            let now = state.clock;
            let mut due: Vec<(Duration, TaskId)> = state
                .tasks
                .iter()
                .filter_map(|(id, t)| t.wake_at.filter(|at| *at <= now).map(|at| (at, *id)))
                .collect();
            due.sort_unstable();
            due
        };

        self.notify(|i| i.after_io_wait(timeout));

        due.into_iter()
            .map(|(_, id)| {
                self.reschedule(id);
                id
            })
            .collect()
    }

    /// Time until the earliest wake-up, if any task has one
    pub fn next_deadline(&self) -> Option<Duration> {
        let state = lock(&self.state);
        let earliest = state.tasks.values().filter_map(|t| t.wake_at).min();
        earliest.map(|at| at.saturating_sub(state.clock))
    }

    /// End of the run; the remaining tasks are abandoned
    pub fn finish(&self) {
        self.notify(|i| i.after_run());
    }

    fn add_task(&self, name: &str, parent: Option<ScopeId>) -> TaskId {
        let id = self.ids.next_task();
        {
            let mut state = lock(&self.state);
            state.tasks.insert(id, SimTask { runnable: true, wake_at: None });
            state.run_queue.push_back(id);
        }
        let info = TaskInfo::new(id, name, parent);
        self.notify(|i| i.task_spawned(&info));
        self.notify(|i| i.task_scheduled(id));
        id
    }

    fn notify(&self, hook: impl Fn(&dyn Instrument)) {
        for instrument in &self.instruments {
            hook(instrument.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::CoroutineFrame;

    fn park(wake_after: Option<Duration>) -> StepOutcome {
        StepOutcome::Park { chain: CoroutineFrame::parked("sleep", None), wake_after }
    }

    #[test]
    fn test_spawned_tasks_are_runnable_in_order() {
        let runtime = SimRuntime::new();
        let root = runtime.start("main");
        let scope = runtime.open_scope(root);
        let a = runtime.spawn(scope, "a");
        let b = runtime.spawn(scope, "b");

        assert_eq!(runtime.take_runnable(), vec![root, a, b]);
        assert!(runtime.take_runnable().is_empty());
    }

    #[test]
    fn test_deadline_wakes_task() {
        let runtime = SimRuntime::new();
        let root = runtime.start("main");
        runtime.take_runnable();
        runtime.step(root, park(Some(Duration::from_secs(2))));

        assert_eq!(runtime.next_deadline(), Some(Duration::from_secs(2)));
        assert!(runtime.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(runtime.advance(Duration::from_secs(1)), vec![root]);
        assert_eq!(runtime.take_runnable(), vec![root]);
        assert_eq!(runtime.next_deadline(), None);
    }

    #[test]
    fn test_statistics_reflect_state() {
        let runtime = SimRuntime::new();
        let stats = runtime.statistics();
        let root = runtime.start("main");
        let scope = runtime.open_scope(root);
        let child = runtime.spawn(scope, "child");

        let raw = stats.statistics();
        assert_eq!((raw.tasks_living, raw.tasks_runnable), (2, 2));
        assert!(raw.seconds_to_next_deadline.is_infinite());
        assert_eq!(raw.io_backend, SIM_IO_BACKEND);

        runtime.take_runnable();
        runtime.step(child, park(Some(Duration::from_millis(1500))));
        runtime.step(root, StepOutcome::Exit);
        let raw = stats.statistics();
        assert_eq!((raw.tasks_living, raw.tasks_runnable), (1, 0));
        assert!((raw.seconds_to_next_deadline - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_reschedule_is_idempotent() {
        let runtime = SimRuntime::new();
        let root = runtime.start("main");
        runtime.take_runnable();
        runtime.step(root, park(None));

        runtime.reschedule(root);
        runtime.reschedule(root);
        assert_eq!(runtime.take_runnable(), vec![root]);
    }

    #[test]
    fn test_step_of_dead_task_ignored() {
        let runtime = SimRuntime::new();
        let root = runtime.start("main");
        runtime.step(root, StepOutcome::Exit);
        runtime.step(root, StepOutcome::Exit);
        assert!(!runtime.is_live(root));
    }
}
