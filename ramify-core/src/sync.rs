//! Keeps a rebuilt conversation tree in step with the store.
//!
//! The coordinator listens to the `messages` change feed and answers every
//! notification with a full re-read and rebuild. Notifications carry no data
//! it relies on, so duplicates, drops (lag) and reordering are all harmless.
//!
//! Known limitation: snapshots are published in the order reads complete.
//! Two coordinators over the same store are not ordered against each other.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::async_store::AsyncStore;
use crate::config::SyncConfig;
use crate::engine::Conversation;
use crate::feed::{Notification, Subscription};
use crate::record::Collection;
use crate::tree::ConversationTree;

/// The latest published view of the conversation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tree: Arc<ConversationTree>,
    /// Completed read attempts, successful or not.
    pub reads: u64,
    /// Error of the most recent read, if it failed. The tree is then the
    /// last one that was read successfully.
    pub last_error: Option<String>,
}

pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Subscribes to message changes and starts the resync task on the current
    /// tokio runtime. The first snapshot is read immediately.
    pub fn spawn<S>(conversation: Conversation<S>, config: SyncConfig) -> SyncHandle
    where
        S: AsyncStore + 'static,
    {
        // Subscribe before the first read so no change can fall between them.
        let subscription = conversation.store().async_subscribe(Collection::Messages);
        let (tx, rx) = watch::channel(Snapshot::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(conversation, subscription, config, tx, shutdown_rx));

        SyncHandle {
            snapshots: rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

async fn run<S: AsyncStore + 'static>(
    conversation: Conversation<S>,
    mut subscription: Subscription,
    config: SyncConfig,
    tx: watch::Sender<Snapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    resync(&conversation, &tx).await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("sync coordinator shutting down");
                break;
            }
            notification = subscription.recv() => {
                match notification {
                    None => {
                        debug!("change feed closed");
                        break;
                    }
                    Some(Notification::Lagged(missed)) => {
                        debug!(missed, "change feed lagged; resyncing");
                    }
                    Some(Notification::Changed(event)) => {
                        debug!(id = %event.id, kind = ?event.kind, "message change");
                    }
                }
                if config.coalesce {
                    let folded = subscription.drain();
                    if folded > 0 {
                        debug!(folded, "coalesced pending notifications");
                    }
                }
                resync(&conversation, &tx).await;
            }
        }
    }
}

async fn resync<S: AsyncStore>(conversation: &Conversation<S>, tx: &watch::Sender<Snapshot>) {
    match conversation.load_tree().await {
        Ok(tree) => {
            tx.send_modify(|snapshot| {
                snapshot.tree = Arc::new(tree);
                snapshot.reads += 1;
                snapshot.last_error = None;
            });
        }
        Err(e) => {
            error!(error = %e, "resync failed; keeping previous tree");
            tx.send_modify(|snapshot| {
                snapshot.reads += 1;
                snapshot.last_error = Some(e.to_string());
            });
        }
    }
}

/// Handle to a running coordinator. Dropping it stops the coordinator.
pub struct SyncHandle {
    snapshots: watch::Receiver<Snapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// An independent receiver for presentation layers.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Waits for the next published snapshot. Returns `None` once the
    /// coordinator has stopped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    /// Waits until a snapshot satisfies `predicate` (checking the current one first).
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&Snapshot) -> bool) -> Option<Snapshot> {
        self.snapshots
            .wait_for(|s| predicate(s))
            .await
            .ok()
            .map(|s| s.clone())
    }

    /// Unsubscribes from the change feed and waits for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
