use snafu::{OptionExt, Snafu, ensure};
use tracing::{debug, error};

use super::node::{Node, NodeId};

/// Separator used by [`Tree::full_path`] and [`Tree::lookup_path`].
pub const PATH_SEPARATOR: char = '/';

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of nodes addressed by [`NodeId`].
///
/// Every attached node is owned by exactly one parent's children map, keyed by
/// the node's own name. Detached nodes stay in the arena until [`Tree::discard`]
/// frees them, which lets an undo log hold on to them.
#[derive(Debug)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.insert(Node::directory(""));
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Stores an unattached node and returns its handle.
    pub fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes in the arena, attached or not.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get(id).context(UnknownNodeSnafu { id })
    }

    /// Files `child` under `parent`, keyed by the child's name.
    ///
    /// A child already filed under the same name is displaced and returned.
    /// The displaced node keeps its stale parent reference.
    pub fn attach_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Option<NodeId>, TreeError> {
        let parent_node = self.node(parent)?;
        ensure!(
            parent_node.is_directory(),
            NotADirectorySnafu {
                name: parent_node.name().to_string(),
            }
        );
        let child_name = self.node(child)?.name().to_string();
        ensure!(
            child != parent && !self.is_descendant_of(parent, child),
            WouldCreateCycleSnafu {
                name: child_name.clone(),
            }
        );

        let displaced = self
            .get_mut(parent)
            .context(UnknownNodeSnafu { id: parent })?
            .children
            .insert(child_name, child)
            .filter(|previous| *previous != child);
        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = Some(parent);
        }

        if let Some(displaced) = displaced {
            debug!("Attaching {} to {} displaced {}", child, parent, displaced);
        }
        Ok(displaced)
    }

    /// Removes the child filed under `name`. The detached node keeps `parent`
    /// as its stale parent reference.
    pub fn detach_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        self.get_mut(parent)
            .context(UnknownNodeSnafu { id: parent })?
            .children
            .remove(name)
            .context(NoSuchChildSnafu {
                name: name.to_string(),
            })
    }

    /// Detaches `node` from its recorded parent, if it is still filed there.
    pub(crate) fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let current = self.get(node)?;
        let parent = current.parent?;
        let name = current.name().to_string();
        if self.get(parent)?.child(&name) != Some(node) {
            return None;
        }
        self.detach_child(parent, &name).ok().map(|_| parent)
    }

    /// Walks the parent chain of `node` looking for `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.get(node).and_then(Node::parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(Node::parent);
        }
        false
    }

    /// Whether `node` is reachable from the root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.is_within(node, self.root)
    }

    /// Whether `node` is `ancestor` or filed somewhere below it. Unlike
    /// [`Tree::is_descendant_of`], stale parent references do not count.
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            let Some(entry) = self.get(current) else {
                return false;
            };
            let Some(parent) = entry.parent() else {
                return false;
            };
            match self.get(parent) {
                Some(parent_node) if parent_node.child(entry.name()) == Some(current) => {
                    current = parent;
                }
                _ => return false,
            }
        }
    }

    /// Display path built from the parent chain. The root renders as `/`.
    pub fn full_path(&self, node: NodeId) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = self.get(node)?;
        while let Some(parent) = current.parent() {
            parts.push(current.name());
            current = match self.get(parent) {
                Some(parent_node) => parent_node,
                None => break,
            };
        }
        parts.reverse();
        Some(format!("{PATH_SEPARATOR}{}", parts.join("/")))
    }

    /// Resolves a `/`-separated path from the root.
    pub fn lookup_path(&self, path: &str) -> Option<NodeId> {
        path.split(PATH_SEPARATOR)
            .filter(|component| !component.is_empty() && *component != ".")
            .try_fold(self.root, |current, component| {
                self.get(current)?.child(component)
            })
    }

    /// Depth-first search from `from`, including `from` itself. Parents come
    /// before their children and siblings follow children-map order.
    pub fn search<P>(&self, from: NodeId, mut predicate: P) -> Vec<NodeId>
    where
        P: FnMut(&Node) -> bool,
    {
        let mut results = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                error!(
                    "Node {} is referenced but missing from the arena {}",
                    id,
                    snafu::location!()
                );
                continue;
            };
            if predicate(node) {
                results.push(id);
            }
            let children = node.children().collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }
        results
    }

    /// Frees `node` and everything below it. Returns the number of freed nodes.
    ///
    /// The caller is responsible for making sure nothing still files the node.
    pub fn discard(&mut self, node: NodeId) -> usize {
        if node == self.root {
            error!("Refusing to discard the root {}", snafu::location!());
            return 0;
        }

        let mut freed = 0;
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            if let Some(removed) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                stack.extend(removed.children.values().copied());
                freed += 1;
            }
        }
        debug!("Discarded {} node(s) starting at {}", freed, node);
        freed
    }
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Node {} does not exist", id))]
    UnknownNode { id: NodeId },
    #[snafu(display("Cannot file children under '{}', it is not a directory", name))]
    NotADirectory { name: String },
    #[snafu(display("No child named '{}'", name))]
    NoSuchChild { name: String },
    #[snafu(display("Filing '{}' there would make it its own ancestor", name))]
    WouldCreateCycle { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::NodeKind;
    use rstest::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let docs = tree.insert(Node::directory("docs"));
        let drafts = tree.insert(Node::directory("drafts"));
        let letter = tree.insert(Node::file("letter.txt", 42));
        tree.attach_child(tree.root(), docs).unwrap();
        tree.attach_child(docs, drafts).unwrap();
        tree.attach_child(drafts, letter).unwrap();
        (tree, docs, drafts, letter)
    }

    #[test]
    fn test_attach_sets_parent_and_files_under_name() {
        let (tree, docs, drafts, letter) = sample();
        assert_eq!(tree.get(drafts).unwrap().parent(), Some(docs));
        assert_eq!(tree.get(drafts).unwrap().child("letter.txt"), Some(letter));
        assert!(tree.is_attached(letter));
    }

    #[test]
    fn test_attach_overwrites_same_name() {
        let (mut tree, docs, _, _) = sample();
        let replacement = tree.insert(Node::file("drafts", 1));
        let displaced = tree.attach_child(docs, replacement).unwrap();
        assert!(displaced.is_some());
        assert_eq!(tree.get(docs).unwrap().child("drafts"), Some(replacement));
        assert!(!tree.is_attached(displaced.unwrap()));
    }

    #[test]
    fn test_attach_into_file_fails() {
        let (mut tree, _, _, letter) = sample();
        let orphan = tree.insert(Node::file("orphan", 0));
        let result = tree.attach_child(letter, orphan);
        assert!(matches!(result, Err(TreeError::NotADirectory { .. })));
    }

    #[test]
    fn test_attach_into_own_descendant_fails() {
        let (mut tree, docs, drafts, _) = sample();
        let result = tree.attach_child(drafts, docs);
        assert!(matches!(result, Err(TreeError::WouldCreateCycle { .. })));
        let result = tree.attach_child(docs, docs);
        assert!(matches!(result, Err(TreeError::WouldCreateCycle { .. })));
    }

    #[test]
    fn test_detach_keeps_stale_parent() {
        let (mut tree, docs, drafts, _) = sample();
        let detached = tree.detach_child(docs, "drafts").unwrap();
        assert_eq!(detached, drafts);
        assert_eq!(tree.get(drafts).unwrap().parent(), Some(docs));
        assert!(!tree.is_attached(drafts));
        assert_eq!(tree.get(docs).unwrap().child_count(), 0);
    }

    #[test]
    fn test_detach_missing_child_fails() {
        let (mut tree, docs, _, _) = sample();
        let result = tree.detach_child(docs, "nope");
        assert!(matches!(result, Err(TreeError::NoSuchChild { .. })));
    }

    #[test]
    fn test_is_descendant_of() {
        let (tree, docs, drafts, letter) = sample();
        assert!(tree.is_descendant_of(letter, docs));
        assert!(tree.is_descendant_of(letter, tree.root()));
        assert!(!tree.is_descendant_of(docs, drafts));
        assert!(!tree.is_descendant_of(docs, docs));
    }

    #[rstest]
    #[case("/", Some("/"))]
    #[case("/docs", Some("/docs"))]
    #[case("docs/drafts/", Some("/docs/drafts"))]
    #[case("/docs/./drafts/letter.txt", Some("/docs/drafts/letter.txt"))]
    #[case("/docs/missing", None)]
    #[case("/docs/drafts/letter.txt/deeper", None)]
    fn test_lookup_path_round_trips_full_path(#[case] path: &str, #[case] expected: Option<&str>) {
        let (tree, _, _, _) = sample();
        let found = tree.lookup_path(path);
        assert_eq!(
            found.and_then(|id| tree.full_path(id)).as_deref(),
            expected
        );
    }

    #[test]
    fn test_search_is_preorder_in_insertion_order() {
        let (mut tree, docs, _, _) = sample();
        let readme = tree.insert(Node::file("readme.md", 3));
        tree.attach_child(docs, readme).unwrap();

        let names = tree
            .search(tree.root(), |_| true)
            .into_iter()
            .map(|id| tree.get(id).unwrap().name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["", "docs", "drafts", "letter.txt", "readme.md"]);
    }

    #[test]
    fn test_search_with_predicate() {
        let (tree, _, _, letter) = sample();
        let files = tree.search(tree.root(), |node| node.kind() == NodeKind::File);
        assert_eq!(files, vec![letter]);
    }

    #[test]
    fn test_discard_frees_subtree_and_invalidates_handles() {
        let (mut tree, docs, drafts, letter) = sample();
        tree.detach_child(tree.root(), "docs").unwrap();
        let before = tree.len();
        assert_eq!(tree.discard(docs), 3);
        assert_eq!(tree.len(), before - 3);
        assert!(!tree.contains(drafts));
        assert!(!tree.contains(letter));

        // A reused slot must not resurrect an old handle
        let fresh = tree.insert(Node::file("fresh", 0));
        assert!(tree.contains(fresh));
        assert!(!tree.contains(docs));
        assert!(!tree.contains(drafts));
        assert!(!tree.contains(letter));
    }

    #[test]
    fn test_is_within_ignores_stale_parents() {
        let (mut tree, docs, _, _) = sample();
        let root = tree.root();
        let note = tree.insert(Node::file("note.txt", 1));
        tree.attach_child(docs, note).unwrap();
        assert!(tree.is_within(note, docs));
        assert!(tree.is_within(docs, docs));

        tree.detach_child(docs, "note.txt").unwrap();
        assert!(tree.is_descendant_of(note, docs));
        assert!(!tree.is_within(note, docs));
        assert!(!tree.is_within(note, root));
    }

    #[test]
    fn test_discard_refuses_root() {
        let mut tree = Tree::new();
        assert_eq!(tree.discard(tree.root()), 0);
        assert!(tree.contains(tree.root()));
    }
}
