use crate::filesystem::{NodeId, NodeKind};
use crate::namespace::NamespaceStore;

pub(crate) fn mkdir(store: &mut NamespaceStore, parent: NodeId, name: &str) -> NodeId {
    let id = store.create_node(name, NodeKind::Directory, 0);
    store.add_node(id, parent).unwrap();
    id
}

pub(crate) fn touch(store: &mut NamespaceStore, parent: NodeId, name: &str, size: u64) -> NodeId {
    let id = store.create_node(name, NodeKind::File, size);
    store.add_node(id, parent).unwrap();
    id
}

/// Names of the children of the node at `path`, sorted.
pub(crate) fn children_of(store: &NamespaceStore, path: &str) -> Vec<String> {
    let id = store
        .lookup_path(path)
        .unwrap_or_else(|| panic!("{path} should exist"));
    let node = store.node(id).unwrap();
    let mut names = node
        .children()
        .map(|child| store.node(child).unwrap().name().to_string())
        .collect::<Vec<_>>();
    names.sort();
    names
}

/// Every reachable node is filed under its own name by its parent and only
/// the root has no parent.
pub(crate) fn assert_tree_invariants(store: &NamespaceStore) {
    let tree = store.tree();
    for id in store.search(|_| true, None) {
        let node = tree.get(id).unwrap();
        match node.parent() {
            None => assert_eq!(id, store.root()),
            Some(parent) => {
                assert_eq!(tree.get(parent).unwrap().child(node.name()), Some(id));
                assert!(!tree.is_descendant_of(parent, id));
            }
        }
    }
}
