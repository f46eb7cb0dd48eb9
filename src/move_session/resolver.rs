use tracing::debug;

use super::conflict::{Conflict, ProgressUpdate, Resolution};

/// Decides conflicts for [`NamespaceStore::move_nodes`](crate::namespace::NamespaceStore::move_nodes).
pub trait ConflictResolver {
    fn resolve(&mut self, conflict: &Conflict) -> Resolution;

    fn progress(&mut self, update: &ProgressUpdate) {
        debug!(
            "Moving: {}% ({}/{}) - {}",
            update.percentage, update.current, update.total, update.node_name
        );
    }
}

impl<F> ConflictResolver for F
where
    F: FnMut(&Conflict) -> Resolution,
{
    fn resolve(&mut self, conflict: &Conflict) -> Resolution {
        self(conflict)
    }
}

/// Answers every conflict the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy(pub Resolution);

impl ConflictResolver for FixedPolicy {
    fn resolve(&mut self, conflict: &Conflict) -> Resolution {
        debug!("{} -> {}", conflict.message, self.0);
        self.0
    }
}
