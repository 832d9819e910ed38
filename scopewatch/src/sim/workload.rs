//! Scripted task behaviour on top of [`SimRuntime`]
//!
//! Each task plays a [`Role`]. Parents open their scopes, spawn into them,
//! close them and park until every child has exited; sleepers park on the
//! clock; stubborn spawners refill their scope forever. The demo workload
//! is the nested-nursery program used to show off the inspector:
//!
//! ```text
//! main ─┬─ <nursery> ─┬─ inspector (sleeps forever)
//!       │             └─ child1
//!       └─ <nursery> ─── child1
//!
//! child1 ── <nursery> ─┬─ child2
//!                      ├─ child2
//!                      └─ sleep_forever
//!
//! child2 ── <nursery> ─┬─ sleep_forever
//!                      └─ stubborn_spawner ── <nursery> ── sleep_seconds x4
//! ```

use std::collections::HashMap;
use std::time::Duration;

use log::debug;

use super::runtime::{SimRuntime, StepOutcome};
use crate::domain::{ScopeId, TaskId};
use crate::stack::{CoroutineFrame, DelegatingFrame, SuspensionHandle};

/// Sleepers spawned by a stubborn spawner per round in the demo
pub const DEMO_STUBBORN_BATCH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Open one scope per group, spawn the group into it, wait for all
    Parent(Vec<Vec<Spawn>>),
    SleepForever,
    Sleep(Duration),
    /// Reopen a scope of `batch` short sleepers whenever the last one exits
    Stubborn { batch: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawn {
    pub name: String,
    pub role: Role,
}

impl Spawn {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self { name: name.into(), role }
    }
}

#[derive(Debug)]
struct TaskProgress {
    name: String,
    role: Role,
    steps: u64,
    parent_scope: Option<ScopeId>,
    waiting_on: Vec<ScopeId>,
}

#[derive(Debug)]
struct ScopeProgress {
    owner: TaskId,
    live_children: usize,
}

pub struct Workload {
    runtime: SimRuntime,
    tasks: HashMap<TaskId, TaskProgress>,
    scopes: HashMap<ScopeId, ScopeProgress>,
    sleeps_issued: u64,
}

impl Workload {
    /// Start a run whose root task plays `role`
    pub fn new(runtime: SimRuntime, root_name: &str, role: Role) -> Self {
        let root = runtime.start(root_name);
        let mut workload =
            Self { runtime, tasks: HashMap::new(), scopes: HashMap::new(), sleeps_issued: 0 };
        workload.track(root, root_name, role, None);
        workload
    }

    /// The nested-nursery demo program
    pub fn demo(runtime: SimRuntime) -> Self {
        Self::new(runtime, "main", demo_main())
    }

    pub fn runtime(&self) -> &SimRuntime {
        &self.runtime
    }

    /// Step every task that is runnable right now
    ///
    /// Tasks spawned during the batch run in the next one. Returns the
    /// number of steps taken.
    pub fn run_batch(&mut self) -> usize {
        let batch = self.runtime.take_runnable();
        for &task in &batch {
            self.step(task);
        }
        batch.len()
    }

    /// One scheduler loop iteration: a batch, then `elapsed` of I/O wait
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        let steps = self.run_batch();
        self.runtime.advance(elapsed);
        steps
    }

    /// Run batches without moving the clock until nothing is runnable
    ///
    /// Gives up after `max_batches`; returns the number of batches run.
    pub fn settle(&mut self, max_batches: usize) -> usize {
        (0..max_batches).take_while(|_| self.run_batch() > 0).count()
    }

    /// Abandon the remaining tasks and end the run
    pub fn finish(self) {
        self.runtime.finish();
    }

    /// Name of a live task, `None` once it has exited
    pub fn task_name(&self, task: TaskId) -> Option<&str> {
        self.tasks.get(&task).map(|p| p.name.as_str())
    }

    /// Live tasks named `name`, in id order
    pub fn tasks_named(&self, name: &str) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> =
            self.tasks.iter().filter(|(_, p)| p.name == name).map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    fn track(&mut self, task: TaskId, name: &str, role: Role, parent_scope: Option<ScopeId>) {
        self.tasks.insert(
            task,
            TaskProgress {
                name: name.to_string(),
                role,
                steps: 0,
                parent_scope,
                waiting_on: Vec::new(),
            },
        );
    }

    fn step(&mut self, task: TaskId) {
        let Some(progress) = self.tasks.get_mut(&task) else {
            return;
        };
        progress.steps += 1;
        let first = progress.steps == 1;
        let name = progress.name.clone();
        let role = progress.role.clone();

        let outcome = match role {
            Role::Parent(groups) if first => self.open_groups(task, &name, groups),
            Role::Parent(_) => StepOutcome::Exit,
            Role::SleepForever => {
                StepOutcome::Park { chain: sleep_forever_chain(&name), wake_after: None }
            }
            Role::Sleep(duration) if first => {
                StepOutcome::Park { chain: sleep_chain(&name), wake_after: Some(duration) }
            }
            Role::Sleep(_) => StepOutcome::Exit,
            Role::Stubborn { batch } => {
                let sleepers = (0..batch)
                    .map(|_| Spawn::new("sleep_seconds", Role::Sleep(self.next_sleep())))
                    .collect();
                self.open_groups(task, &name, vec![sleepers])
            }
        };

        let exited = matches!(outcome, StepOutcome::Exit);
        self.runtime.step(task, outcome);
        if exited {
            self.on_exit(task);
        }
    }

    fn open_groups(&mut self, task: TaskId, name: &str, groups: Vec<Vec<Spawn>>) -> StepOutcome {
        let mut waiting_on = Vec::new();
        for group in groups {
            let scope = self.runtime.open_scope(task);
            let live_children = group.len();
            for spawn in group {
                let child = self.runtime.spawn(scope, &spawn.name);
                self.track(child, &spawn.name, spawn.role, Some(scope));
            }
            // Body done; the scope now only waits for its children
            self.runtime.close_scope(scope);
            if live_children > 0 {
                self.scopes.insert(scope, ScopeProgress { owner: task, live_children });
                waiting_on.push(scope);
            }
        }

        if waiting_on.is_empty() {
            return StepOutcome::Exit;
        }
        if let Some(progress) = self.tasks.get_mut(&task) {
            progress.waiting_on = waiting_on;
        }
        StepOutcome::Park { chain: wait_children_chain(name), wake_after: None }
    }

    fn on_exit(&mut self, task: TaskId) {
        let Some(progress) = self.tasks.remove(&task) else {
            return;
        };
        let Some(scope) = progress.parent_scope else {
            debug!("Root task {} finished", progress.name);
            return;
        };
        let Some(entry) = self.scopes.get_mut(&scope) else {
            return;
        };

        entry.live_children -= 1;
        if entry.live_children > 0 {
            return;
        }
        let owner = entry.owner;
        self.scopes.remove(&scope);

        if let Some(owner_progress) = self.tasks.get_mut(&owner) {
            owner_progress.waiting_on.retain(|s| *s != scope);
            if owner_progress.waiting_on.is_empty() {
                self.runtime.reschedule(owner);
            }
        }
    }

    /// Deterministic 1..=10 second naps
    fn next_sleep(&mut self) -> Duration {
        self.sleeps_issued += 1;
        Duration::from_secs(1 + (self.sleeps_issued - 1) % 10)
    }
}

fn demo_main() -> Role {
    Role::Parent(vec![
        vec![Spawn::new("inspector", Role::SleepForever), Spawn::new("child1", demo_child1())],
        vec![Spawn::new("child1", demo_child1())],
    ])
}

fn demo_child1() -> Role {
    Role::Parent(vec![vec![
        Spawn::new("child2", demo_child2()),
        Spawn::new("child2", demo_child2()),
        Spawn::new("sleep_forever", Role::SleepForever),
    ]])
}

fn demo_child2() -> Role {
    Role::Parent(vec![vec![
        Spawn::new("sleep_forever", Role::SleepForever),
        Spawn::new("stubborn_spawner", Role::Stubborn { batch: DEMO_STUBBORN_BATCH }),
    ]])
}

// =============================================================================
// SUSPENSION CHAINS
// =============================================================================

fn sleep_forever_chain(name: &str) -> SuspensionHandle {
    let wait = CoroutineFrame::parked("wait_task_rescheduled", None);
    let until = CoroutineFrame::parked("sleep_until", Some(wait));
    CoroutineFrame::parked(name, Some(until))
}

fn sleep_chain(name: &str) -> SuspensionHandle {
    let wait = CoroutineFrame::parked("wait_task_rescheduled", None);
    let deadline = DelegatingFrame::wrapping("sleep_until", Some(wait));
    let sleep = CoroutineFrame::parked("sleep", Some(deadline));
    CoroutineFrame::parked(name, Some(sleep))
}

fn wait_children_chain(name: &str) -> SuspensionHandle {
    let wait = CoroutineFrame::parked("wait_task_rescheduled", None);
    let join = CoroutineFrame::parked("scope_exit", Some(wait));
    CoroutineFrame::parked(name, Some(join))
}
