//! # Task/Scope Tree Model
//!
//! In-memory mirror of the scheduler's structured-concurrency hierarchy:
//! tasks own the scope-groups (nurseries) opened in their body, and scopes
//! own the tasks spawned into them.
//!
//! ```text
//! main ─┬─ <nursery> ─┬─ child1 ── <nursery> ── ...
//!       │             └─ inspector
//!       └─ <nursery> ─── child1 ── ...
//! ```
//!
//! ## Storage
//!
//! Nodes live in two arenas keyed by id; parent/child links are ids and
//! child order is the order of the `Vec`s (spawn order for tasks, open
//! order for scopes). Queries never use the arenas as an index: lookups walk
//! from the root, so only nodes reachable from the root are ever returned.
//!
//! ## Removal
//!
//! - Exited tasks are detached from their parent scope immediately.
//! - A closed scope is removed once it has no child tasks; until then it
//!   stays visible, marked closing.
//! - A task exiting while it still owns scopes takes its whole subtree
//!   with it (logged, since a well-behaved scheduler never does this).
//!
//! All mutation happens under the inspector's lock, so snapshots never see
//! a half-applied removal.

use std::collections::HashMap;

use log::warn;
use scopewatch_common::SCOPE_DISPLAY_NAME;

use super::event::TreeEvent;
use super::view::{NodeKind, TreeView, ViewNode};
use crate::domain::{ScopeId, TaskId, TreeError};
use crate::stack::SuspensionHandle;

/// A live task
#[derive(Debug)]
pub struct TaskNode {
    id: TaskId,
    name: String,
    parent_scope: Option<ScopeId>,
    child_scopes: Vec<ScopeId>,
    suspension: Option<SuspensionHandle>,
}

impl TaskNode {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` only for the root task
    pub fn parent_scope(&self) -> Option<ScopeId> {
        self.parent_scope
    }

    pub fn child_scopes(&self) -> &[ScopeId] {
        &self.child_scopes
    }

    /// Head of the current suspension chain; `None` while running
    pub fn suspension(&self) -> Option<&SuspensionHandle> {
        self.suspension.as_ref()
    }
}

/// A live scope-group
#[derive(Debug)]
pub struct ScopeNode {
    id: ScopeId,
    parent_task: TaskId,
    child_tasks: Vec<TaskId>,
    closing: bool,
}

impl ScopeNode {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn parent_task(&self) -> TaskId {
        self.parent_task
    }

    pub fn child_tasks(&self) -> &[TaskId] {
        &self.child_tasks
    }

    /// Closed by the scheduler but still waiting on children
    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

/// Borrowed node yielded by [`TaskTree::walk`]
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Task(&'a TaskNode),
    Scope(&'a ScopeNode),
}

#[derive(Debug, Clone, Copy)]
enum NodeKey {
    Task(TaskId),
    Scope(ScopeId),
}

#[derive(Debug, Default)]
pub struct TaskTree {
    tasks: HashMap<TaskId, TaskNode>,
    scopes: HashMap<ScopeId, ScopeNode>,
}

impl TaskTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    // ------------------------------------------------------------------
    // Mutation (hook side)
    // ------------------------------------------------------------------

    /// Apply one scheduler event
    ///
    /// # Errors
    /// Returns the model violation the event would have caused; the tree is
    /// left unchanged in that case.
    pub fn apply(&mut self, event: TreeEvent) -> Result<(), TreeError> {
        match event {
            TreeEvent::TaskSpawned { id, name, parent } => self.attach_task(id, name, parent),
            TreeEvent::ScopeOpened { id, parent } => self.open_scope(id, parent),
            TreeEvent::ScopeClosed { id } => self.close_scope(id).map(|_| ()),
            TreeEvent::SuspensionChanged { id, suspension } => self.set_suspension(id, suspension),
            TreeEvent::TaskExited { id } => self.remove_task(id).map(|_| ()),
        }
    }

    /// Attach a freshly spawned task as the last child of `parent`
    ///
    /// # Errors
    /// `DuplicateTask`, `UnknownScope`, or `SecondRoot` for a parentless
    /// task when a root already exists.
    pub fn attach_task(
        &mut self,
        id: TaskId,
        name: impl Into<String>,
        parent: Option<ScopeId>,
    ) -> Result<(), TreeError> {
        if self.tasks.contains_key(&id) {
            return Err(TreeError::DuplicateTask(id));
        }

        match parent {
            Some(scope_id) => {
                let scope =
                    self.scopes.get_mut(&scope_id).ok_or(TreeError::UnknownScope(scope_id))?;
                scope.child_tasks.push(id);
            }
            None => {
                if let Ok(root) = self.get_root() {
                    return Err(TreeError::SecondRoot { existing: root.id, new: id });
                }
            }
        }

        self.tasks.insert(
            id,
            TaskNode {
                id,
                name: name.into(),
                parent_scope: parent,
                child_scopes: Vec::new(),
                suspension: None,
            },
        );
        Ok(())
    }

    /// Attach a scope opened in the body of `parent`
    ///
    /// # Errors
    /// `DuplicateScope` or `UnknownTask`.
    pub fn open_scope(&mut self, id: ScopeId, parent: TaskId) -> Result<(), TreeError> {
        if self.scopes.contains_key(&id) {
            return Err(TreeError::DuplicateScope(id));
        }
        let task = self.tasks.get_mut(&parent).ok_or(TreeError::UnknownTask(parent))?;
        task.child_scopes.push(id);

        self.scopes.insert(
            id,
            ScopeNode { id, parent_task: parent, child_tasks: Vec::new(), closing: false },
        );
        Ok(())
    }

    /// Close a scope; returns `true` if it was removed right away
    ///
    /// # Errors
    /// `UnknownScope`.
    pub fn close_scope(&mut self, id: ScopeId) -> Result<bool, TreeError> {
        let scope = self.scopes.get_mut(&id).ok_or(TreeError::UnknownScope(id))?;
        if scope.child_tasks.is_empty() {
            self.unlink_scope(id);
            Ok(true)
        } else {
            scope.closing = true;
            Ok(false)
        }
    }

    /// Replace the task's suspension handle
    ///
    /// # Errors
    /// `UnknownTask`.
    pub fn set_suspension(
        &mut self,
        id: TaskId,
        suspension: Option<SuspensionHandle>,
    ) -> Result<(), TreeError> {
        let task = self.tasks.get_mut(&id).ok_or(TreeError::UnknownTask(id))?;
        task.suspension = suspension;
        Ok(())
    }

    /// Detach an exited task; returns how many nodes were removed
    ///
    /// # Errors
    /// `UnknownTask`.
    pub fn remove_task(&mut self, id: TaskId) -> Result<usize, TreeError> {
        let parent = self.tasks.get(&id).ok_or(TreeError::UnknownTask(id))?.parent_scope;

        if let Some(scope_id) = parent {
            if let Some(scope) = self.scopes.get_mut(&scope_id) {
                scope.child_tasks.retain(|t| *t != id);
                if scope.closing && scope.child_tasks.is_empty() {
                    self.unlink_scope(scope_id);
                }
            }
        }

        let removed = self.drop_subtree(NodeKey::Task(id));
        if removed > 1 {
            warn!("{id} exited with open scopes; dropped {} descendant nodes", removed - 1);
        }
        Ok(removed)
    }

    /// Remove a scope with no children and unlink it from its parent task
    fn unlink_scope(&mut self, id: ScopeId) {
        if let Some(scope) = self.scopes.remove(&id) {
            if let Some(task) = self.tasks.get_mut(&scope.parent_task) {
                task.child_scopes.retain(|s| *s != id);
            }
        }
    }

    /// Remove a node and everything below it, iteratively
    fn drop_subtree(&mut self, start: NodeKey) -> usize {
        let mut pending = vec![start];
        let mut removed = 0;

        while let Some(key) = pending.pop() {
            match key {
                NodeKey::Task(id) => {
                    if let Some(task) = self.tasks.remove(&id) {
                        removed += 1;
                        pending.extend(task.child_scopes.into_iter().map(NodeKey::Scope));
                    }
                }
                NodeKey::Scope(id) => {
                    if let Some(scope) = self.scopes.remove(&id) {
                        removed += 1;
                        pending.extend(scope.child_tasks.into_iter().map(NodeKey::Task));
                    }
                }
            }
        }

        removed
    }

    // ------------------------------------------------------------------
    // Queries (read side)
    // ------------------------------------------------------------------

    /// The task with no parent scope
    ///
    /// Found by climbing parent links from an arbitrary live task.
    ///
    /// # Errors
    /// `NoRootFound` if the tree is empty (scheduler not started yet).
    pub fn get_root(&self) -> Result<&TaskNode, TreeError> {
        let mut task = self.tasks.values().next().ok_or(TreeError::NoRootFound)?;

        while let Some(scope_id) = task.parent_scope {
            let scope = self.scopes.get(&scope_id).ok_or(TreeError::UnknownScope(scope_id))?;
            let parent = scope.parent_task;
            task = self.tasks.get(&parent).ok_or(TreeError::UnknownTask(parent))?;
        }

        Ok(task)
    }

    /// Depth-first pre-order walk from the root
    ///
    /// Scopes are visited in open order, tasks within a scope in spawn
    /// order. Yields nothing for an empty tree.
    pub fn walk(&self) -> Walk<'_> {
        let stack = self.get_root().map(|root| vec![NodeRef::Task(root)]).unwrap_or_default();
        Walk { tree: self, stack }
    }

    /// Look up a task reachable from the root
    pub fn find_task_by_id(&self, id: TaskId) -> Option<&TaskNode> {
        self.walk().find_map(|node| match node {
            NodeRef::Task(task) if task.id == id => Some(task),
            _ => None,
        })
    }

    /// Look up a scope reachable from the root
    pub fn find_scope_by_id(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.walk().find_map(|node| match node {
            NodeRef::Scope(scope) if scope.id == id => Some(scope),
            _ => None,
        })
    }

    /// Copy the whole tree into an immutable view
    ///
    /// One traversal with an explicit stack; the caller must hold the tree
    /// for the duration so the copy is a single point in time.
    ///
    /// # Errors
    /// `NoRootFound` if the tree is empty.
    pub fn snapshot(&self) -> Result<TreeView, TreeError> {
        let root = self.get_root()?;
        let mut view = TreeView::default();
        let mut pending: Vec<(NodeRef<'_>, Option<usize>)> = vec![(NodeRef::Task(root), None)];

        while let Some((node, parent)) = pending.pop() {
            match node {
                NodeRef::Task(task) => {
                    let index = view.push(
                        ViewNode {
                            kind: NodeKind::Task,
                            id: task.id.0,
                            name: task.name.clone(),
                            children: Vec::new(),
                        },
                        parent,
                    );
                    for scope_id in task.child_scopes.iter().rev() {
                        if let Some(scope) = self.scopes.get(scope_id) {
                            pending.push((NodeRef::Scope(scope), Some(index)));
                        }
                    }
                }
                NodeRef::Scope(scope) => {
                    let index = view.push(
                        ViewNode {
                            kind: NodeKind::Scope,
                            id: scope.id.0,
                            name: SCOPE_DISPLAY_NAME.to_string(),
                            children: Vec::new(),
                        },
                        parent,
                    );
                    for task_id in scope.child_tasks.iter().rev() {
                        if let Some(task) = self.tasks.get(task_id) {
                            pending.push((NodeRef::Task(task), Some(index)));
                        }
                    }
                }
            }
        }

        Ok(view)
    }
}

/// Iterator returned by [`TaskTree::walk`]
pub struct Walk<'a> {
    tree: &'a TaskTree,
    stack: Vec<NodeRef<'a>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let tree = self.tree;
        match node {
            NodeRef::Task(task) => {
                let scopes = task.child_scopes.iter().rev().filter_map(|id| tree.scopes.get(id));
                self.stack.extend(scopes.map(NodeRef::Scope));
            }
            NodeRef::Scope(scope) => {
                let tasks = scope.child_tasks.iter().rev().filter_map(|id| tree.tasks.get(id));
                self.stack.extend(tasks.map(NodeRef::Task));
            }
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::CoroutineFrame;

    /// main
    /// ├── scope 10: [t1, t2]
    /// └── scope 11: [t3]
    ///                └── scope 12: [t4]
    fn sample() -> TaskTree {
        let mut tree = TaskTree::new();
        tree.attach_task(TaskId(1), "main", None).unwrap();
        tree.open_scope(ScopeId(10), TaskId(1)).unwrap();
        tree.attach_task(TaskId(2), "t1", Some(ScopeId(10))).unwrap();
        tree.attach_task(TaskId(3), "t2", Some(ScopeId(10))).unwrap();
        tree.open_scope(ScopeId(11), TaskId(1)).unwrap();
        tree.attach_task(TaskId(4), "t3", Some(ScopeId(11))).unwrap();
        tree.open_scope(ScopeId(12), TaskId(4)).unwrap();
        tree.attach_task(TaskId(5), "t4", Some(ScopeId(12))).unwrap();
        tree
    }

    fn walk_ids(tree: &TaskTree) -> Vec<u64> {
        tree.walk()
            .map(|n| match n {
                NodeRef::Task(t) => t.id().0,
                NodeRef::Scope(s) => s.id().0,
            })
            .collect()
    }

    #[test]
    fn test_empty_tree_has_no_root() {
        let tree = TaskTree::new();
        assert_eq!(tree.get_root().unwrap_err(), TreeError::NoRootFound);
        assert_eq!(tree.snapshot().unwrap_err(), TreeError::NoRootFound);
        assert_eq!(tree.walk().count(), 0);
    }

    #[test]
    fn test_root_found_from_any_task() {
        let tree = sample();
        assert_eq!(tree.get_root().unwrap().id(), TaskId(1));
        assert_eq!(tree.get_root().unwrap().name(), "main");
    }

    #[test]
    fn test_walk_order_is_spawn_order() {
        let tree = sample();
        assert_eq!(walk_ids(&tree), vec![1, 10, 2, 3, 11, 4, 12, 5]);
    }

    #[test]
    fn test_find_task_and_scope() {
        let tree = sample();
        assert_eq!(tree.find_task_by_id(TaskId(5)).unwrap().name(), "t4");
        assert_eq!(tree.find_scope_by_id(ScopeId(12)).unwrap().parent_task(), TaskId(4));
        assert!(tree.find_task_by_id(TaskId(99)).is_none());
        // A scope id is never returned as a task
        assert!(tree.find_task_by_id(TaskId(10)).is_none());
    }

    #[test]
    fn test_rejects_bad_events() {
        let mut tree = sample();
        assert_eq!(
            tree.attach_task(TaskId(2), "again", Some(ScopeId(10))).unwrap_err(),
            TreeError::DuplicateTask(TaskId(2))
        );
        assert_eq!(
            tree.attach_task(TaskId(50), "orphan", Some(ScopeId(77))).unwrap_err(),
            TreeError::UnknownScope(ScopeId(77))
        );
        assert_eq!(
            tree.attach_task(TaskId(51), "root2", None).unwrap_err(),
            TreeError::SecondRoot { existing: TaskId(1), new: TaskId(51) }
        );
        assert_eq!(
            tree.open_scope(ScopeId(60), TaskId(88)).unwrap_err(),
            TreeError::UnknownTask(TaskId(88))
        );
        assert_eq!(
            tree.open_scope(ScopeId(10), TaskId(1)).unwrap_err(),
            TreeError::DuplicateScope(ScopeId(10))
        );
        // Nothing changed
        assert_eq!(walk_ids(&tree), vec![1, 10, 2, 3, 11, 4, 12, 5]);
    }

    #[test]
    fn test_exit_detaches_task() {
        let mut tree = sample();
        assert_eq!(tree.remove_task(TaskId(2)).unwrap(), 1);
        assert!(tree.find_task_by_id(TaskId(2)).is_none());
        assert_eq!(tree.find_scope_by_id(ScopeId(10)).unwrap().child_tasks(), &[TaskId(3)]);
        assert_eq!(tree.remove_task(TaskId(2)).unwrap_err(), TreeError::UnknownTask(TaskId(2)));
    }

    #[test]
    fn test_close_empty_scope_removes_it() {
        let mut tree = TaskTree::new();
        tree.attach_task(TaskId(1), "main", None).unwrap();
        tree.open_scope(ScopeId(2), TaskId(1)).unwrap();
        assert!(tree.close_scope(ScopeId(2)).unwrap());
        assert!(tree.get_root().unwrap().child_scopes().is_empty());
        assert_eq!(tree.scope_count(), 0);
    }

    #[test]
    fn test_closing_scope_waits_for_children() {
        let mut tree = sample();
        assert!(!tree.close_scope(ScopeId(10)).unwrap());
        assert!(tree.find_scope_by_id(ScopeId(10)).unwrap().is_closing());

        tree.remove_task(TaskId(2)).unwrap();
        assert!(tree.find_scope_by_id(ScopeId(10)).is_some());

        tree.remove_task(TaskId(3)).unwrap();
        assert!(tree.find_scope_by_id(ScopeId(10)).is_none());
        assert_eq!(tree.get_root().unwrap().child_scopes(), &[ScopeId(11)]);
    }

    #[test]
    fn test_exit_with_open_scopes_drops_subtree() {
        let mut tree = sample();
        // t3 still owns scope 12 with t4 inside
        assert_eq!(tree.remove_task(TaskId(4)).unwrap(), 3);
        assert!(tree.find_task_by_id(TaskId(5)).is_none());
        assert_eq!(tree.task_count(), 3);
        assert_eq!(tree.scope_count(), 2);
        assert_eq!(walk_ids(&tree), vec![1, 10, 2, 3, 11]);
    }

    #[test]
    fn test_root_exit_empties_tree() {
        let mut tree = sample();
        tree.remove_task(TaskId(1)).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.scope_count(), 0);
    }

    #[test]
    fn test_suspension_round_trip() {
        let mut tree = sample();
        let handle = CoroutineFrame::parked("sleep", None);
        tree.set_suspension(TaskId(3), Some(handle)).unwrap();
        assert!(tree.find_task_by_id(TaskId(3)).unwrap().suspension().is_some());

        tree.set_suspension(TaskId(3), None).unwrap();
        assert!(tree.find_task_by_id(TaskId(3)).unwrap().suspension().is_none());
    }

    #[test]
    fn test_snapshot_matches_walk() {
        let tree = sample();
        let view = tree.snapshot().unwrap();
        let ids: Vec<u64> = view.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, walk_ids(&tree));
        assert_eq!(view.task_count(), 5);
        assert_eq!(view.scope_count(), 3);

        let nested = view.to_task_view().unwrap();
        assert_eq!(nested.scopes.len(), 2);
        assert_eq!(nested.scopes[0].tasks[1].name, "t2");
        assert_eq!(nested.scopes[1].tasks[0].scopes[0].tasks[0].name, "t4");
        assert_eq!(nested.scopes[0].name, SCOPE_DISPLAY_NAME);
    }

    #[test]
    fn test_apply_events() {
        let mut tree = TaskTree::new();
        let main = TreeEvent::TaskSpawned { id: TaskId(1), name: "main".into(), parent: None };
        tree.apply(main).unwrap();
        tree.apply(TreeEvent::ScopeOpened { id: ScopeId(2), parent: TaskId(1) }).unwrap();
        let worker =
            TreeEvent::TaskSpawned { id: TaskId(3), name: "w".into(), parent: Some(ScopeId(2)) };
        tree.apply(worker).unwrap();
        tree.apply(TreeEvent::TaskExited { id: TaskId(3) }).unwrap();
        tree.apply(TreeEvent::ScopeClosed { id: ScopeId(2) }).unwrap();
        assert_eq!(walk_ids(&tree), vec![1]);
    }
}
