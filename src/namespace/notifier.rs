use std::fmt;

use derive_more::Display;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::filesystem::{NodeId, Tree};

use super::Operation;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    #[display("applied")]
    Applied,
    #[display("undone")]
    Undone,
}

/// Published after every mutation of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub operation: Operation,
    /// Parents whose children changed.
    pub scopes: Vec<NodeId>,
}

impl ChangeEvent {
    /// Whether a view showing the subtree under `view_root` is affected.
    pub fn touches(&self, tree: &Tree, view_root: NodeId) -> bool {
        self.scopes
            .iter()
            .any(|scope| *scope == view_root || tree.is_descendant_of(*scope, view_root))
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("subscription-{_0}")]
pub struct SubscriptionId(u64);

pub type Listener = Box<dyn FnMut(&ChangeEvent)>;

/// Synchronous observer list plus channel subscribers.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Vec<(SubscriptionId, Listener)>,
    channels: Vec<UnboundedSender<ChangeEvent>>,
    next_id: u64,
}

impl ChangeNotifier {
    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        debug!("Registered {}", id);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Events are delivered until the receiver is dropped.
    pub fn subscribe_channel(&mut self) -> UnboundedReceiver<ChangeEvent> {
        let (sender, receiver) = mpsc::unbounded();
        self.channels.push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len() + self.channels.len()
    }

    pub fn notify(&mut self, event: &ChangeEvent) {
        debug!(
            "Notifying {} subscriber(s) of {} {} touching {} scope(s)",
            self.subscriber_count(),
            event.kind,
            event.operation.kind(),
            event.scopes.len()
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
        self.channels
            .retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
