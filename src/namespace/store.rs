use std::time::SystemTime;

use futures_channel::mpsc::UnboundedReceiver;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

use crate::filesystem::{NameError, Node, NodeId, NodeKind, Tree, validate_name};
use crate::move_session::{ConflictResolver, MoveError, MoveReport, MoveSession, MoveStep};

use super::notifier::{ChangeEvent, ChangeKind, ChangeNotifier, SubscriptionId};
use super::operation::{Operation, OperationKind, Placement, UndoLog, dedup_in_order};

/// Owner of the namespace tree.
///
/// Every structural mutation goes through the store, which keeps a one-slot
/// undo history and publishes a [`ChangeEvent`] after each change.
#[derive(Debug, Default)]
pub struct NamespaceStore {
    tree: Tree,
    undo_log: UndoLog,
    notifier: ChangeNotifier,
}

impl NamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn full_path(&self, id: NodeId) -> Option<String> {
        self.tree.full_path(id)
    }

    pub fn lookup_path(&self, path: &str) -> Option<NodeId> {
        self.tree.lookup_path(path)
    }

    pub fn fingerprint(&self, id: NodeId) -> Option<u64> {
        self.tree.fingerprint(id)
    }

    /// Creates an unattached node. It becomes visible once added somewhere.
    ///
    /// The name is not checked here; [`add_nodes`](Self::add_nodes) refuses
    /// nodes whose name fails [`validate_name`].
    pub fn create_node(&mut self, name: impl Into<String>, kind: NodeKind, size: u64) -> NodeId {
        self.tree.insert(Node::new(name, kind, size))
    }

    /// Like [`create_node`](Self::create_node), but rejects invalid names up front.
    pub fn try_create_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        size: u64,
    ) -> Result<NodeId, StoreError> {
        let name = name.into();
        validate_name(&name).context(InvalidNameSnafu)?;
        Ok(self.create_node(name, kind, size))
    }

    pub fn create_node_at(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        size: u64,
        created: SystemTime,
    ) -> NodeId {
        self.tree
            .insert(Node::with_created(name, kind, size, created))
    }

    pub fn add_node(&mut self, node: NodeId, parent: NodeId) -> Result<(), StoreError> {
        self.add_nodes(&[node], parent).map(|_| ())
    }

    /// Files `nodes` under `parent`, overwriting same-named children.
    ///
    /// Name validation is the caller's job. Nodes that are already attached
    /// elsewhere, or that would become their own ancestor, are skipped.
    /// Returns the nodes that were added.
    pub fn add_nodes(
        &mut self,
        nodes: &[NodeId],
        parent: NodeId,
    ) -> Result<Vec<NodeId>, StoreError> {
        let parent_node = self
            .tree
            .get(parent)
            .ok_or(StoreError::UnknownNode { id: parent })?;
        ensure!(
            parent_node.is_directory(),
            NotADirectorySnafu {
                path: self.tree.full_path(parent).unwrap_or_default(),
            }
        );

        let mut added = Vec::new();
        let mut displaced = Vec::new();
        for &node in nodes {
            if !self.tree.contains(node) {
                warn!("Cannot add unknown node {}", node);
                continue;
            }
            if let Some(Err(e)) = self.tree.get(node).map(|n| validate_name(n.name())) {
                warn!("Cannot add node {}: {}", node, e);
                continue;
            }
            if self.tree.is_attached(node) {
                warn!(
                    "Node {} is already attached at {}, refusing to file it twice",
                    node,
                    self.tree.full_path(node).unwrap_or_default()
                );
                continue;
            }
            // Unlink from a detached former parent so the node has one owner
            self.tree.detach(node);

            match self.tree.attach_child(parent, node) {
                Ok(overwritten) => {
                    added.push(node);
                    if let Some(overwritten) = overwritten {
                        if added.contains(&overwritten) {
                            warn!(
                                "Node {} was overwritten by {} in the same batch, discarding it",
                                overwritten, node
                            );
                            added.retain(|id| *id != overwritten);
                            self.discard_if_detached(overwritten);
                        } else {
                            displaced.push(overwritten);
                        }
                    }
                }
                Err(e) => warn!("Skipping node {}: {}", node, e),
            }
        }

        if added.is_empty() {
            debug!("Nothing added under {}", parent);
            return Ok(added);
        }

        info!(
            "Added {} node(s) under {}",
            added.len(),
            self.tree.full_path(parent).unwrap_or_default()
        );
        self.record(
            Operation::Add {
                parent,
                nodes: added.clone(),
                displaced,
            },
            vec![parent],
        );
        Ok(added)
    }

    /// Detaches `node` from `parent` if it is filed there.
    pub fn delete_node(&mut self, node: NodeId, parent: NodeId) -> bool {
        let name = match self.tree.get(node) {
            Some(entry) => entry.name().to_string(),
            None => {
                warn!("Cannot delete unknown node {}", node);
                return false;
            }
        };
        if self.tree.get(parent).and_then(|p| p.child(&name)) != Some(node) {
            warn!("Node '{}' is not a child of {}, nothing deleted", name, parent);
            return false;
        }
        if self.tree.detach_child(parent, &name).is_err() {
            return false;
        }

        info!("Deleted '{}'", name);
        self.record(
            Operation::Delete {
                nodes: vec![Placement::new(node, parent)],
            },
            vec![parent],
        );
        true
    }

    /// Detaches each node from its current parent. Returns the detached nodes.
    pub fn delete_nodes(&mut self, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut deleted = Vec::new();
        for &node in nodes {
            if node == self.tree.root() {
                warn!("Refusing to delete the root");
                continue;
            }
            if !self.tree.is_attached(node) {
                warn!("Node {} is not in the tree, nothing to delete", node);
                continue;
            }
            match self.tree.detach(node) {
                Some(parent) => deleted.push(Placement::new(node, parent)),
                None => warn!("Node {} is not filed under its parent", node),
            }
        }

        if deleted.is_empty() {
            return Vec::new();
        }

        info!("Deleted {} node(s)", deleted.len());
        let mut scopes = deleted.iter().map(|p| p.parent).collect::<Vec<_>>();
        dedup_in_order(&mut scopes);
        let ids = deleted.iter().map(|p| p.node).collect();
        self.record(Operation::Delete { nodes: deleted }, scopes);
        ids
    }

    /// Starts a step-wise move of `sources` into `target`.
    ///
    /// Fails when `target` is unknown, detached or not a directory.
    pub fn begin_move(
        &self,
        sources: &[NodeId],
        target: NodeId,
    ) -> Result<MoveSession, MoveError> {
        MoveSession::new(self, sources, target)
    }

    /// Runs a move to completion, asking `resolver` about every conflict.
    ///
    /// Returns `None` when the move was cancelled or nothing was moved.
    pub fn move_nodes<R>(
        &mut self,
        sources: &[NodeId],
        target: NodeId,
        resolver: &mut R,
    ) -> Result<Option<MoveReport>, MoveError>
    where
        R: ConflictResolver + ?Sized,
    {
        let mut session = self.begin_move(sources, target)?;
        loop {
            match session.step(self) {
                MoveStep::Conflict(conflict) => {
                    let resolution = resolver.resolve(&conflict);
                    session.resolve(resolution)?;
                }
                MoveStep::Progress(update) => resolver.progress(&update),
                MoveStep::Completed(report) => return Ok(report),
                MoveStep::Cancelled => return Ok(None),
            }
        }
    }

    /// Reverts the last recorded operation and forgets it.
    pub fn undo_last_operation(&mut self) -> Option<OperationKind> {
        let Some(operation) = self.undo_log.take() else {
            warn!("Nothing to undo");
            return None;
        };

        let kind = operation.kind();
        let (scopes, orphaned) = operation.revert(&mut self.tree);
        for node in orphaned {
            self.discard_if_detached(node);
        }
        info!("Undid {} operation", kind);

        self.notifier.notify(&ChangeEvent {
            kind: ChangeKind::Undone,
            operation,
            scopes,
        });
        Some(kind)
    }

    pub fn last_operation(&self) -> Option<&Operation> {
        self.undo_log.peek()
    }

    /// Drops the undo history, discarding any node only the history kept alive.
    pub fn clear_history(&mut self) {
        if let Some(previous) = self.undo_log.take() {
            self.release(previous);
        }
    }

    /// Matching nodes at or below `from` (the root when `None`), parents first.
    pub fn search<P>(&self, predicate: P, from: Option<NodeId>) -> Vec<NodeId>
    where
        P: FnMut(&Node) -> bool,
    {
        self.tree.search(from.unwrap_or(self.tree.root()), predicate)
    }

    pub fn all_directories(&self) -> Vec<NodeId> {
        self.search(Node::is_directory, None)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn subscribe_channel(&mut self) -> UnboundedReceiver<ChangeEvent> {
        self.notifier.subscribe_channel()
    }

    /// Makes `operation` the undoable one and publishes it.
    pub(crate) fn record(&mut self, operation: Operation, scopes: Vec<NodeId>) {
        let event = ChangeEvent {
            kind: ChangeKind::Applied,
            operation: operation.clone(),
            scopes,
        };
        let keep = operation.referenced_nodes();
        if let Some(previous) = self.undo_log.record(operation) {
            self.release_except(previous, &keep);
        }
        self.notifier.notify(&event);
    }

    fn release(&mut self, operation: Operation) {
        self.release_except(operation, &[]);
    }

    /// Discards the detached nodes of `operation`, sparing any that hold one
    /// of `keep` in their subtree.
    fn release_except(&mut self, operation: Operation, keep: &[NodeId]) {
        for node in operation.detached_nodes() {
            if keep.iter().any(|kept| self.tree.is_within(*kept, node)) {
                debug!("Keeping {}, the new record still uses it", node);
                continue;
            }
            self.discard_if_detached(node);
        }
    }

    fn discard_if_detached(&mut self, node: NodeId) {
        if !self.tree.contains(node) || self.tree.is_attached(node) {
            return;
        }
        self.tree.detach(node);
        self.tree.discard(node);
    }
}

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("Node {} does not exist", id))]
    UnknownNode { id: NodeId },
    #[snafu(display("'{}' is not a directory", path))]
    NotADirectory { path: String },
    #[snafu(display("Cannot create node"))]
    InvalidName { source: NameError },
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::*;

    use super::*;
    use crate::test_support::{assert_tree_invariants, mkdir, touch};

    #[test]
    fn test_add_then_undo_restores_previous_tree() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        mkdir(&mut store, root, "docs");
        let before = store.fingerprint(root);

        let notes = touch(&mut store, root, "notes.txt", 5);
        assert_ne!(store.fingerprint(root), before);

        assert_eq!(store.undo_last_operation(), Some(OperationKind::Add));
        assert_eq!(store.fingerprint(root), before);
        // Nothing keeps the undone node alive
        assert!(store.node(notes).is_none());
        assert_tree_invariants(&store);
    }

    #[test]
    fn test_add_overwrites_and_undo_restores_overwritten() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let original = touch(&mut store, root, "a.txt", 1);
        let before = store.fingerprint(root);

        let newer = touch(&mut store, root, "a.txt", 2);
        assert_eq!(store.lookup_path("/a.txt"), Some(newer));
        assert_eq!(
            store.last_operation(),
            Some(&Operation::Add {
                parent: root,
                nodes: vec![newer],
                displaced: vec![original],
            })
        );

        store.undo_last_operation();
        assert_eq!(store.lookup_path("/a.txt"), Some(original));
        assert_eq!(store.fingerprint(root), before);
    }

    #[test]
    fn test_add_into_file_is_rejected() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let file = touch(&mut store, root, "a.txt", 1);
        let orphan = store.create_node("b.txt", NodeKind::File, 1);

        let result = store.add_node(orphan, file);
        assert!(matches!(result, Err(StoreError::NotADirectory { .. })));
    }

    #[test]
    fn test_add_skips_nodes_already_in_tree() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let music = mkdir(&mut store, root, "music");
        let fresh = store.create_node("fresh.txt", NodeKind::File, 1);

        let added = store.add_nodes(&[docs, fresh], music).unwrap();
        assert_eq!(added, vec![fresh]);
        assert_eq!(store.lookup_path("/docs"), Some(docs));
        assert_tree_invariants(&store);
    }

    #[test]
    fn test_add_rejects_cycle_in_detached_subtree() {
        let mut store = NamespaceStore::new();
        let outer = store.create_node("outer", NodeKind::Directory, 0);
        let inner = store.create_node("inner", NodeKind::Directory, 0);
        store.add_node(inner, outer).unwrap();

        let added = store.add_nodes(&[outer], inner).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_delete_node_requires_matching_parent() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let file = touch(&mut store, root, "a.txt", 1);

        assert!(!store.delete_node(file, docs));
        assert!(store.delete_node(file, root));
        assert!(store.lookup_path("/a.txt").is_none());
    }

    #[test]
    fn test_delete_then_undo_restores_subtree() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let drafts = mkdir(&mut store, docs, "drafts");
        touch(&mut store, drafts, "letter.txt", 42);
        touch(&mut store, docs, "readme.md", 7);
        let before = store.fingerprint(root);

        let deleted = store.delete_nodes(&[drafts]);
        assert_eq!(deleted, vec![drafts]);
        assert!(store.lookup_path("/docs/drafts").is_none());

        assert_eq!(store.undo_last_operation(), Some(OperationKind::Delete));
        assert_eq!(store.lookup_path("/docs/drafts"), Some(drafts));
        assert_eq!(store.node(drafts).unwrap().parent(), Some(docs));
        assert_eq!(store.fingerprint(root), before);
        assert_tree_invariants(&store);
    }

    #[test]
    fn test_delete_nodes_skips_root_and_detached() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let file = touch(&mut store, root, "a.txt", 1);
        store.delete_nodes(&[file]);

        let deleted = store.delete_nodes(&[root, file]);
        assert!(deleted.is_empty());
        // The failed call did not replace the undoable record
        assert_eq!(store.last_operation().map(Operation::kind), Some(OperationKind::Delete));
    }

    #[test]
    fn test_deleted_nodes_are_discarded_once_history_moves_on() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let letter = touch(&mut store, docs, "letter.txt", 1);
        store.delete_nodes(&[docs]);
        assert!(store.node(docs).is_some());

        mkdir(&mut store, root, "music");
        assert!(store.node(docs).is_none());
        assert!(store.node(letter).is_none());
    }

    #[test]
    fn test_undo_with_empty_history_is_noop() {
        let mut store = NamespaceStore::new();
        assert_eq!(store.undo_last_operation(), None);
    }

    #[test]
    fn test_undo_is_not_itself_undoable() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        touch(&mut store, root, "a.txt", 1);

        assert!(store.undo_last_operation().is_some());
        assert!(store.undo_last_operation().is_none());
        assert!(store.lookup_path("/a.txt").is_none());
    }

    #[test]
    fn test_clear_history_discards_detached_nodes() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let file = touch(&mut store, root, "a.txt", 1);
        store.delete_nodes(&[file]);

        store.clear_history();
        assert!(store.last_operation().is_none());
        assert!(store.node(file).is_none());
    }

    #[test]
    fn test_subscribers_see_applied_and_undone_events() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let id = store.subscribe(move |event: &ChangeEvent| {
            sink.borrow_mut()
                .push((event.kind, event.operation.kind(), event.scopes.clone()));
        });

        touch(&mut store, docs, "a.txt", 1);
        store.undo_last_operation();
        assert_eq!(
            *events.borrow(),
            vec![
                (ChangeKind::Applied, OperationKind::Add, vec![docs]),
                (ChangeKind::Undone, OperationKind::Add, vec![docs]),
            ]
        );

        assert!(store.unsubscribe(id));
        touch(&mut store, docs, "b.txt", 1);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_search_and_all_directories() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let drafts = mkdir(&mut store, docs, "drafts");
        let report = touch(&mut store, drafts, "Report.txt", 3);
        touch(&mut store, root, "report-old.txt", 3);

        assert_eq!(store.all_directories(), vec![root, docs, drafts]);

        let matches = store.search(
            |node| node.name().to_lowercase().contains("report"),
            Some(docs),
        );
        assert_eq!(matches, vec![report]);
    }

    #[test]
    fn test_adding_into_a_deleted_directory_keeps_it_alive() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        store.delete_nodes(&[docs]);

        let note = store.create_node("note.txt", NodeKind::File, 1);
        let added = store.add_nodes(&[note], docs).unwrap();

        assert_eq!(added, vec![note]);
        assert!(store.node(docs).is_some());
        assert_eq!(store.node(note).unwrap().parent(), Some(docs));
        assert_eq!(store.node(docs).unwrap().child("note.txt"), Some(note));

        store.undo_last_operation();
        assert!(store.node(note).is_none());
        assert!(store.node(docs).is_some());
    }

    #[test]
    fn test_same_name_twice_in_one_batch_keeps_the_last() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let first = store.create_node("a.txt", NodeKind::File, 1);
        let second = store.create_node("a.txt", NodeKind::File, 2);

        let added = store.add_nodes(&[first, second], root).unwrap();

        assert_eq!(added, vec![second]);
        assert_eq!(store.lookup_path("/a.txt"), Some(second));
        assert!(store.node(first).is_none());
        assert_eq!(
            store.last_operation(),
            Some(&Operation::Add {
                parent: root,
                nodes: vec![second],
                displaced: vec![],
            })
        );
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    fn test_invalid_names_are_rejected(#[case] name: &str) {
        let mut store = NamespaceStore::new();
        let root = store.root();

        let result = store.try_create_node(name, NodeKind::File, 1);
        assert!(matches!(result, Err(StoreError::InvalidName { .. })));

        let unchecked = store.create_node(name, NodeKind::File, 1);
        let added = store.add_nodes(&[unchecked], root).unwrap();
        assert!(added.is_empty());
        assert!(store.last_operation().is_none());
    }

    #[test]
    fn test_valid_names_round_trip_through_paths() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let id = store
            .try_create_node("report final.txt", NodeKind::File, 1)
            .unwrap();
        store.add_node(id, root).unwrap();

        let path = store.full_path(id).unwrap();
        assert_eq!(path, "/report final.txt");
        assert_eq!(store.lookup_path(&path), Some(id));
    }

    #[test]
    fn test_readding_a_deleted_child_unlinks_it_from_old_parent() {
        let mut store = NamespaceStore::new();
        let root = store.root();
        let docs = mkdir(&mut store, root, "docs");
        let letter = touch(&mut store, docs, "letter.txt", 1);
        store.delete_nodes(&[docs]);

        store.add_node(letter, root).unwrap();
        // The old parent is discarded without taking the re-added child along
        assert!(store.node(docs).is_none());
        assert_eq!(store.lookup_path("/letter.txt"), Some(letter));
        assert_tree_invariants(&store);
    }
}
