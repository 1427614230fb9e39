//! Change notification fan-out for stores.
//!
//! Every store owns a [`ChangeFeed`] and publishes one [`ChangeEvent`] per
//! successful write. Subscribers get a [`Subscription`] per collection. Events
//! are a hint that something changed; consumers are expected to re-read rather
//! than apply events as deltas, so dropped (lagged) events are reported as a
//! plain notification instead of an error.

use tokio::sync::broadcast;

use crate::id::RecordId;
use crate::record::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: RecordId,
}

/// What a subscriber observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Changed(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
}

/// Per-collection broadcast channels.
#[derive(Debug)]
pub struct ChangeFeed {
    messages: broadcast::Sender<ChangeEvent>,
    versions: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a feed whose channels buffer up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (messages, _) = broadcast::channel(capacity);
        let (versions, _) = broadcast::channel(capacity);
        Self { messages, versions }
    }

    fn sender(&self, collection: Collection) -> &broadcast::Sender<ChangeEvent> {
        match collection {
            Collection::Messages => &self.messages,
            Collection::MessageVersions => &self.versions,
        }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, collection: Collection, kind: ChangeKind, id: RecordId) {
        let _ = self.sender(collection).send(ChangeEvent {
            collection,
            kind,
            id,
        });
    }

    pub fn subscribe(&self, collection: Collection) -> Subscription {
        Subscription {
            collection,
            rx: self.sender(collection).subscribe(),
        }
    }

    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.sender(collection).receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// A live subscription to one collection's change feed.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Waits for the next notification. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        match self.rx.recv().await {
            Ok(event) => Some(Notification::Changed(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Notification::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Returns a pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(event) => Some(Notification::Changed(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Notification::Lagged(n)),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                None
            }
        }
    }

    /// Drains everything already queued and returns how many notifications were consumed.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.try_recv().is_some() {
            n += 1;
        }
        n
    }

    pub fn unsubscribe(self) {}
}
