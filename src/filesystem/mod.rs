//! Arena-backed tree of named files and directories.
//!
//! Nodes are addressed by [`NodeId`] handles. Each node records its parent as a
//! handle and its children as a name-keyed ordered map of handles, so parent
//! lookup stays O(1) without shared mutable references.

mod fingerprint;
mod node;
mod tree;

pub use node::{NameError, Node, NodeId, NodeKind, validate_name};
pub use tree::{PATH_SEPARATOR, Tree, TreeError};
