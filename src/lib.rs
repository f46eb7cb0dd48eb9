//! In-memory hierarchical namespace of files and directories.
//!
//! [`NamespaceStore`] owns the tree and exposes create, delete and move with
//! one level of undo. Moves run as a [`MoveSession`] that stops at every name
//! conflict and reports progress while it mutates the tree.

pub mod config;
pub mod filesystem;
pub mod move_session;
pub mod namespace;

#[cfg(test)]
mod test_support;

pub use filesystem::{Node, NodeId, NodeKind, Tree};
pub use move_session::{ConflictResolver, FixedPolicy, MoveSession, MoveStep, Resolution};
pub use namespace::{ChangeEvent, NamespaceStore, Operation, OperationKind};
