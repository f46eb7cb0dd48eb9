use derive_more::Display;
use tracing::{debug, warn};

use crate::filesystem::{NodeId, Tree};

/// A node together with the parent it belongs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub node: NodeId,
    pub parent: NodeId,
}

impl Placement {
    pub fn new(node: NodeId, parent: NodeId) -> Self {
        Self { node, parent }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    #[display("add")]
    Add,
    #[display("delete")]
    Delete,
    #[display("move")]
    Move,
}

/// Description of the last mutation, enough to invert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `nodes` were filed under `parent`; `displaced` are the same-named
    /// children they overwrote.
    Add {
        parent: NodeId,
        nodes: Vec<NodeId>,
        displaced: Vec<NodeId>,
    },
    /// Detached nodes with the parent each one had.
    Delete { nodes: Vec<Placement> },
    /// `moved` pairs each node with its parent before the move. `dissolved`
    /// are source directories merged into an existing directory, `replaced`
    /// are target children removed by a replace resolution.
    Move {
        moved: Vec<Placement>,
        dissolved: Vec<Placement>,
        replaced: Vec<Placement>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Add { .. } => OperationKind::Add,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Move { .. } => OperationKind::Move,
        }
    }

    /// Nodes this record keeps alive outside the tree.
    pub(crate) fn detached_nodes(&self) -> Vec<NodeId> {
        match self {
            Operation::Add { displaced, .. } => displaced.clone(),
            Operation::Delete { nodes } => nodes.iter().map(|p| p.node).collect(),
            Operation::Move {
                dissolved,
                replaced,
                ..
            } => dissolved.iter().chain(replaced).map(|p| p.node).collect(),
        }
    }

    /// Every node and parent the record points at.
    pub(crate) fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Operation::Add {
                parent,
                nodes,
                displaced,
            } => std::iter::once(*parent)
                .chain(nodes.iter().copied())
                .chain(displaced.iter().copied())
                .collect(),
            Operation::Delete { nodes } => nodes.iter().flat_map(|p| [p.node, p.parent]).collect(),
            Operation::Move {
                moved,
                dissolved,
                replaced,
            } => moved
                .iter()
                .chain(dissolved)
                .chain(replaced)
                .flat_map(|p| [p.node, p.parent])
                .collect(),
        }
    }

    /// Applies the inverse of this operation to `tree`.
    ///
    /// Returns the parents whose children changed and the nodes the inverse
    /// left detached.
    pub(crate) fn revert(&self, tree: &mut Tree) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut scopes = Vec::new();
        let mut orphaned = Vec::new();

        match self {
            Operation::Add {
                parent,
                nodes,
                displaced,
            } => {
                scopes.push(*parent);
                for node in nodes.iter().rev() {
                    if tree.get(*node).and_then(|n| n.parent()) == Some(*parent)
                        && tree.detach(*node).is_some()
                    {
                        orphaned.push(*node);
                    } else {
                        warn!("Added node {} is no longer under {}, leaving it", node, parent);
                    }
                }
                for node in displaced.iter().rev() {
                    reattach(tree, Placement::new(*node, *parent));
                }
            }
            Operation::Delete { nodes } => {
                for placement in nodes.iter().rev() {
                    reattach(tree, *placement);
                    scopes.push(placement.parent);
                }
            }
            Operation::Move {
                moved,
                dissolved,
                replaced,
            } => {
                for placement in moved.iter().rev() {
                    if let Some(current) = tree.detach(placement.node) {
                        scopes.push(current);
                    }
                    reattach(tree, *placement);
                    scopes.push(placement.parent);
                }
                for placement in dissolved.iter().rev().chain(replaced.iter().rev()) {
                    reattach(tree, *placement);
                    scopes.push(placement.parent);
                }
            }
        }

        dedup_in_order(&mut scopes);
        (scopes, orphaned)
    }
}

fn reattach(tree: &mut Tree, placement: Placement) {
    match tree.attach_child(placement.parent, placement.node) {
        Ok(None) => debug!("Restored {} under {}", placement.node, placement.parent),
        Ok(Some(displaced)) => warn!(
            "Restoring {} under {} displaced {}",
            placement.node, placement.parent, displaced
        ),
        Err(e) => warn!("Cannot restore {}: {}", placement.node, e),
    }
}

pub(crate) fn dedup_in_order(ids: &mut Vec<NodeId>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

/// Single-slot history. A new record overwrites the previous one and undo
/// consumes it; there is no redo.
#[derive(Debug, Default)]
pub struct UndoLog {
    last: Option<Operation>,
}

impl UndoLog {
    /// Stores `operation` and hands back the record it displaced.
    pub fn record(&mut self, operation: Operation) -> Option<Operation> {
        debug!("Recording {} operation", operation.kind());
        self.last.replace(operation)
    }

    pub fn take(&mut self) -> Option<Operation> {
        self.last.take()
    }

    pub fn peek(&self) -> Option<&Operation> {
        self.last.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}
