//! The namespace store: structural mutations, one-level undo and change
//! notifications on top of the [`filesystem`](crate::filesystem) arena.

mod notifier;
mod operation;
mod store;

pub use notifier::{ChangeEvent, ChangeKind, ChangeNotifier, Listener, SubscriptionId};
pub use operation::{Operation, OperationKind, Placement, UndoLog};
pub use store::{NamespaceStore, StoreError};

pub(crate) use operation::dedup_in_order;
