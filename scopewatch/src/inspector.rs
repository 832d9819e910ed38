//! # Inspector
//!
//! Explicit owner of the live task tree. One instance is created by whoever
//! starts the scheduler; the hook side gets a [`HookAdapter`] from it and the
//! query side gets a shared reference.
//!
//! ## Hand-off
//!
//! ```text
//! scheduler thread                         query side
//! ────────────────                         ──────────
//! hook ──► publish(event) ──► channel
//!            │                   │
//!            └─ try_lock ─► drain ┤
//!                                 └──◄ drain ◄─ lock ◄─ with_tree(f)
//! ```
//!
//! Hooks never wait for the lock: they queue the event and apply the queue
//! only when the lock is free. Readers take the lock, drain the queue, and
//! read the tree in one critical section, so every read sees all events
//! published before it and nothing torn.
//!
//! A hook applies at most [`MAX_EVENTS_PER_HOOK`] queued events per call.
//! A backlog built up behind a long read is worked off a batch per hook,
//! or in full by the next reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::warn;

use crate::instrument::HookAdapter;
use crate::tree::{TaskTree, TreeEvent};

/// Upper bound on queued events a single hook call applies
pub const MAX_EVENTS_PER_HOOK: usize = 64;

#[derive(Debug)]
pub struct Inspector {
    tree: Mutex<TaskTree>,
    events_tx: Sender<TreeEvent>,
    events_rx: Receiver<TreeEvent>,
    rejected: AtomicU64,
}

impl Inspector {
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            tree: Mutex::new(TaskTree::new()),
            events_tx,
            events_rx,
            rejected: AtomicU64::new(0),
        }
    }

    /// Hook adapter to register with the scheduler
    #[must_use]
    pub fn hooks(self: &Arc<Self>) -> HookAdapter {
        HookAdapter::new(Arc::clone(self))
    }

    /// Queue a tree mutation without blocking
    ///
    /// Applied immediately if nobody is reading the tree, otherwise by the
    /// next reader or hook that gets the lock. Oldest events go first.
    pub fn publish(&self, event: TreeEvent) {
        if let Err(e) = self.events_tx.send(event) {
            // Receiver lives in self, so this only happens mid-drop
            warn!("Dropped {} event: channel closed", e.0.kind());
            return;
        }

        match self.tree.try_lock() {
            Ok(mut tree) => self.drain(&mut tree, MAX_EVENTS_PER_HOOK),
            Err(TryLockError::Poisoned(poisoned)) => {
                self.drain(&mut poisoned.into_inner(), MAX_EVENTS_PER_HOOK);
            }
            Err(TryLockError::WouldBlock) => {}
        }
    }

    /// Run `f` against an up-to-date tree in one critical section
    ///
    /// Keep `f` short and free of I/O; hooks queue up while it runs.
    pub fn with_tree<R>(&self, f: impl FnOnce(&TaskTree) -> R) -> R {
        let mut tree = self.lock_tree();
        self.drain(&mut tree, usize::MAX);
        f(&tree)
    }

    /// Events the tree refused (unknown parents, duplicate ids, ...)
    pub fn rejected_events(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Events queued but not yet applied
    pub fn pending_events(&self) -> usize {
        self.events_rx.len()
    }

    fn lock_tree(&self) -> MutexGuard<'_, TaskTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self, tree: &mut TaskTree, limit: usize) {
        for event in self.events_rx.try_iter().take(limit) {
            let kind = event.kind();
            if let Err(e) = tree.apply(event) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected {kind} event: {e}");
            }
        }
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}
