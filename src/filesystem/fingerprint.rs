use std::hash::{Hash, Hasher};
use std::time::UNIX_EPOCH;

use metrohash::MetroHash64;

use super::{NodeId, Tree};

impl Tree {
    /// Structural hash of the subtree rooted at `node`.
    ///
    /// Covers name, kind, size, creation time and children, with children
    /// visited in name order so that insertion order does not matter.
    /// Returns `None` for an unknown node.
    pub fn fingerprint(&self, node: NodeId) -> Option<u64> {
        let mut hasher = MetroHash64::default();
        self.hash_subtree(node, &mut hasher)?;
        Some(hasher.finish())
    }

    fn hash_subtree(&self, node: NodeId, hasher: &mut MetroHash64) -> Option<()> {
        let entry = self.get(node)?;
        entry.name().hash(hasher);
        entry.kind().hash(hasher);
        entry.size().hash(hasher);
        entry
            .created()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
            .hash(hasher);

        let mut children = entry.children.iter().collect::<Vec<_>>();
        children.sort_by(|(a, _), (b, _)| a.cmp(b));
        children.len().hash(hasher);
        for (_, child) in children {
            self.hash_subtree(*child, hasher)?;
        }
        Some(())
    }
}
