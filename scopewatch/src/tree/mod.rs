//! Task/scope hierarchy
//!
//! - `model`: the live, mutable tree and its lookups
//! - `event`: the mutations hooks feed into it
//! - `view`: immutable snapshots handed to the query surface

pub mod event;
pub mod model;
pub mod view;

pub use event::TreeEvent;
pub use model::{NodeRef, ScopeNode, TaskNode, TaskTree, Walk};
pub use view::{NodeKind, TreeView, ViewNode};
