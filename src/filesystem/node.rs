use std::time::SystemTime;

use derive_more::{Display, IsVariant};
use hashlink::LinkedHashMap;
use snafu::{Snafu, ensure};

use super::tree::PATH_SEPARATOR;

/// Handle to a node stored in a [`Tree`](super::Tree).
///
/// The generation distinguishes a live node from an earlier occupant of the
/// same slot, so a handle kept after its node was discarded resolves to nothing.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("#{index}v{generation}")]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, IsVariant)]
pub enum NodeKind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
}

/// A single file or directory entry.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    size: u64,
    created: SystemTime,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: LinkedHashMap<String, NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind, size: u64) -> Self {
        Self::with_created(name, kind, size, SystemTime::now())
    }

    pub fn with_created(
        name: impl Into<String>,
        kind: NodeKind,
        size: u64,
        created: SystemTime,
    ) -> Self {
        let size = match kind {
            NodeKind::File => size,
            NodeKind::Directory => 0,
        };

        Self {
            name: name.into(),
            kind,
            size,
            created,
            parent: None,
            children: LinkedHashMap::new(),
        }
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, NodeKind::File, size)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Directory, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Last known parent. Kept after the node is detached so the move can be undone.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    /// Children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Checks that `name` can be filed in a directory: not empty and free of
/// the path separator.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    ensure!(!name.is_empty(), EmptyNameSnafu);
    ensure!(
        !name.contains(PATH_SEPARATOR),
        ContainsSeparatorSnafu { name }
    );
    Ok(())
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum NameError {
    #[snafu(display("Invalid name. Cannot be empty"))]
    EmptyName,
    #[snafu(display("Invalid name '{}'. Cannot contain '{}'", name, PATH_SEPARATOR))]
    ContainsSeparator { name: String },
}
