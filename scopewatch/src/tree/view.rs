//! Immutable point-in-time copy of the task tree.
//!
//! Stored flat: `nodes` is in pre-order, so the root task is `nodes[0]` and
//! every child index is greater than its parent's. Both conversions below
//! rely on that ordering instead of recursion, which keeps arbitrarily deep
//! nursery nesting off the native call stack.

use std::io::{self, Write};

use scopewatch_common::{ScopeView, TaskView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Task,
    Scope,
}

/// One node of the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewNode {
    pub kind: NodeKind,
    pub id: u64,
    pub name: String,
    /// Indices into the owning view, in spawn/open order
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeView {
    nodes: Vec<ViewNode>,
}

impl TreeView {
    /// Append a node and link it under `parent`; returns its index
    pub(crate) fn push(&mut self, node: ViewNode, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    #[must_use]
    pub fn root(&self) -> Option<&ViewNode> {
        self.nodes.first()
    }

    #[must_use]
    pub fn nodes(&self) -> &[ViewNode] {
        &self.nodes
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Task).count()
    }

    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Scope).count()
    }

    /// Write the `/tasks.json` document
    ///
    /// Emits `{"id":..,"name":..,"scopes":[..]}` for tasks and
    /// `{"id":..,"name":..,"tasks":[..]}` for scopes, using an explicit
    /// stack of `(node, next child)` cursors.
    ///
    /// # Errors
    /// Returns an error if the writer fails.
    pub fn write_json<W: Write>(&self, mut out: W) -> io::Result<()> {
        if self.nodes.is_empty() {
            return out.write_all(b"null");
        }

        self.open_node(&mut out, 0)?;
        let mut cursors: Vec<(usize, usize)> = vec![(0, 0)];

        while let Some(&(index, next)) = cursors.last() {
            match self.nodes[index].children.get(next) {
                Some(&child) => {
                    if let Some(top) = cursors.last_mut() {
                        top.1 += 1;
                    }
                    if next > 0 {
                        out.write_all(b",")?;
                    }
                    self.open_node(&mut out, child)?;
                    cursors.push((child, 0));
                }
                None => {
                    out.write_all(b"]}")?;
                    cursors.pop();
                }
            }
        }

        Ok(())
    }

    fn open_node<W: Write>(&self, out: &mut W, index: usize) -> io::Result<()> {
        let node = &self.nodes[index];
        write!(out, "{{\"id\":{},\"name\":", node.id)?;
        serde_json::to_writer(&mut *out, &node.name).map_err(io::Error::from)?;
        match node.kind {
            NodeKind::Task => out.write_all(b",\"scopes\":["),
            NodeKind::Scope => out.write_all(b",\"tasks\":["),
        }
    }

    /// Serialize to a JSON string
    ///
    /// # Errors
    /// Only fails if a name cannot be encoded.
    pub fn to_json_string(&self) -> io::Result<String> {
        let mut buffer = Vec::new();
        self.write_json(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Convert into the nested wire records
    ///
    /// Builds children before parents by visiting indices in reverse.
    #[must_use]
    pub fn to_task_view(&self) -> Option<TaskView> {
        enum Built {
            Task(TaskView),
            Scope(ScopeView),
        }

        let mut built: Vec<Option<Built>> = Vec::with_capacity(self.nodes.len());
        built.resize_with(self.nodes.len(), || None);

        for (index, node) in self.nodes.iter().enumerate().rev() {
            let children = node.children.iter().filter_map(|&c| built[c].take());
            let entry = match node.kind {
                NodeKind::Task => Built::Task(TaskView {
                    id: node.id,
                    name: node.name.clone(),
                    scopes: children
                        .filter_map(|b| match b {
                            Built::Scope(s) => Some(s),
                            Built::Task(_) => None,
                        })
                        .collect(),
                }),
                NodeKind::Scope => Built::Scope(ScopeView {
                    id: node.id,
                    name: node.name.clone(),
                    tasks: children
                        .filter_map(|b| match b {
                            Built::Task(t) => Some(t),
                            Built::Scope(_) => None,
                        })
                        .collect(),
                }),
            };
            built[index] = Some(entry);
        }

        match built.into_iter().next().flatten() {
            Some(Built::Task(root)) => Some(root),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: NodeKind, id: u64, name: &str) -> ViewNode {
        ViewNode { kind, id, name: name.to_string(), children: Vec::new() }
    }

    /// main -> nursery -> [a, b]
    fn small_view() -> TreeView {
        let mut view = TreeView::default();
        let root = view.push(node(NodeKind::Task, 1, "main"), None);
        let scope = view.push(node(NodeKind::Scope, 2, "<nursery>"), Some(root));
        view.push(node(NodeKind::Task, 3, "a"), Some(scope));
        view.push(node(NodeKind::Task, 4, "b"), Some(scope));
        view
    }

    #[test]
    fn test_write_json_shape() {
        let json = small_view().to_json_string().unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"id":1,"name":"main","scopes":[{"id":2,"name":"<nursery>","tasks":["#,
                r#"{"id":3,"name":"a","scopes":[]},{"id":4,"name":"b","scopes":[]}]}]}"#
            )
        );
    }

    #[test]
    fn test_write_json_matches_nested_records() {
        let view = small_view();
        let parsed: TaskView = serde_json::from_str(&view.to_json_string().unwrap()).unwrap();
        assert_eq!(Some(parsed), view.to_task_view());
    }

    #[test]
    fn test_names_are_escaped() {
        let mut view = TreeView::default();
        view.push(node(NodeKind::Task, 1, "say \"hi\"\n"), None);
        let json = view.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "say \"hi\"\n");
    }

    #[test]
    fn test_empty_view_is_null() {
        assert_eq!(TreeView::default().to_json_string().unwrap(), "null");
        assert!(TreeView::default().to_task_view().is_none());
    }

    #[test]
    fn test_counts() {
        let view = small_view();
        assert_eq!(view.task_count(), 3);
        assert_eq!(view.scope_count(), 1);
        assert_eq!(view.root().unwrap().name, "main");
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        // 50k levels of task -> scope -> task ... would overflow a recursive writer
        let mut view = TreeView::default();
        let mut parent = view.push(node(NodeKind::Task, 0, "t"), None);
        for i in 0..50_000u64 {
            let scope = view.push(node(NodeKind::Scope, 2 * i + 1, "s"), Some(parent));
            parent = view.push(node(NodeKind::Task, 2 * i + 2, "t"), Some(scope));
        }

        let json = view.to_json_string().unwrap();
        assert!(json.starts_with(r#"{"id":0,"name":"t","scopes":[{"id":1"#));
        assert!(json.ends_with("]}]}"));
        assert_eq!(json.matches('{').count(), view.nodes().len());

        let nested = view.to_task_view().unwrap();
        assert_eq!(nested.count_nodes(), (50_001, 50_000));
        drop(nested);
    }
}
