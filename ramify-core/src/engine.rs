//! Branch, edit and delete operations over a conversation store.
//!
//! Each operation is a short sequence of independent store calls with a fixed
//! order; nothing is rolled back. The ordering guarantees:
//!
//! - edit writes the ledger entry before touching the message, so prior
//!   content is never lost (at worst a stale duplicate entry remains);
//! - delete purges the ledger before the message and stops if the purge fails;
//! - branch inserts the child before logging it against the parent, and a
//!   failed log entry does not undo the child.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::async_store::AsyncStore;
use crate::clock::{Clock, SystemClock};
use crate::id::MessageId;
use crate::ledger::Ledger;
use crate::record::{Message, MessageBody, MessagePatch, VersionRecord};
use crate::table::{Table, TableError};
use crate::tree::ConversationTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateRoot,
    CreateBranch,
    EditMessage,
    DeleteMessage,
    FetchHistory,
    ReadMessage,
    LoadTree,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::CreateRoot => "create root",
            Operation::CreateBranch => "create branch",
            Operation::EditMessage => "edit message",
            Operation::DeleteMessage => "delete message",
            Operation::FetchHistory => "fetch history",
            Operation::ReadMessage => "read message",
            Operation::LoadTree => "load tree",
        })
    }
}

/// A store read or write failed partway through an operation.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {source}")]
pub struct EngineError {
    pub operation: Operation,
    #[source]
    pub source: TableError,
}

fn during(operation: Operation) -> impl FnOnce(TableError) -> EngineError {
    move |source| EngineError { operation, source }
}

/// Result of a successful [`Conversation::create_branch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub message: Message,
    /// The entry logged on the parent's ledger; `None` if that write failed.
    pub ledger_entry: Option<VersionRecord>,
}

/// Mutation and read API for one conversation store.
pub struct Conversation<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for Conversation<S> {
    fn clone(&self) -> Self {
        Conversation {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: AsyncStore> Conversation<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Conversation { store, clock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn messages(&self) -> Table<'_, S, Message> {
        Table::new(&*self.store)
    }

    fn ledger(&self) -> Ledger<'_, S> {
        Ledger::new(&*self.store)
    }

    /// Starts a new top-level thread.
    ///
    /// Blank content (empty after trimming) is ignored and returns `Ok(None)`.
    /// The initial content is not recorded in the new message's ledger.
    pub async fn create_root(&self, content: &str) -> Result<Option<Message>, EngineError> {
        if content.trim().is_empty() {
            debug!("ignoring blank root message");
            return Ok(None);
        }

        let message = self
            .messages()
            .insert(MessageBody {
                content: content.to_string(),
                parent_id: None,
                current_version: 1,
                created_at: self.clock.now(),
            })
            .await
            .map_err(during(Operation::CreateRoot))?;

        info!(message_id = %message.id, "created root message");
        Ok(Some(message))
    }

    /// Adds a child under `parent_id` and logs the branch on the parent's ledger
    /// as version `latest + 1`. The parent message itself is not modified.
    ///
    /// Blank content or a missing parent is a no-op returning `Ok(None)`.
    pub async fn create_branch(
        &self,
        parent_id: MessageId,
        content: &str,
    ) -> Result<Option<Branch>, EngineError> {
        if content.trim().is_empty() {
            debug!(%parent_id, "ignoring blank branch");
            return Ok(None);
        }

        let parent = self
            .messages()
            .get(parent_id)
            .await
            .map_err(during(Operation::CreateBranch))?;
        if parent.is_none() {
            warn!(%parent_id, "branch parent not found");
            return Ok(None);
        }

        let ledger = self.ledger();
        let version = ledger
            .latest_version(parent_id)
            .await
            .map_err(during(Operation::CreateBranch))?
            + 1;

        let now = self.clock.now();
        let message = self
            .messages()
            .insert(MessageBody {
                content: content.to_string(),
                parent_id: Some(parent_id),
                current_version: 1,
                created_at: now,
            })
            .await
            .map_err(during(Operation::CreateBranch))?;

        let ledger_entry = match ledger
            .append(parent_id, content.to_string(), version, now)
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!(
                    %parent_id,
                    message_id = %message.id,
                    version,
                    error = %e,
                    "branch created but parent ledger entry was not written"
                );
                None
            }
        };

        info!(%parent_id, message_id = %message.id, version, "created branch");
        Ok(Some(Branch {
            message,
            ledger_entry,
        }))
    }

    /// Replaces a message's content, first recording the superseded content
    /// and version in its ledger.
    ///
    /// Returns `Ok(None)` if the message does not exist, vanished before
    /// the update could be applied, or is already at `u32::MAX` (nothing is
    /// written in that case).
    pub async fn edit_message(
        &self,
        id: MessageId,
        new_content: &str,
    ) -> Result<Option<Message>, EngineError> {
        let Some(current) = self
            .messages()
            .get(id)
            .await
            .map_err(during(Operation::EditMessage))?
        else {
            warn!(message_id = %id, "edit target not found");
            return Ok(None);
        };

        let Some(next_version) = current.current_version.checked_add(1) else {
            warn!(message_id = %id, version = current.current_version, "version counter exhausted; edit ignored");
            return Ok(None);
        };

        self.ledger()
            .append(id, current.content, current.current_version, self.clock.now())
            .await
            .map_err(during(Operation::EditMessage))?;

        let updated = self
            .messages()
            .update(
                id,
                MessagePatch {
                    content: Some(new_content.to_string()),
                    current_version: Some(next_version),
                },
            )
            .await
            .map_err(during(Operation::EditMessage))?;

        match &updated {
            Some(_) => info!(message_id = %id, version = next_version, "edited message"),
            None => warn!(message_id = %id, "message removed during edit; ledger entry kept"),
        }
        Ok(updated)
    }

    /// Deletes a message and its ledger. Children are left in place with
    /// their parent link dangling.
    ///
    /// Returns whether the message existed.
    pub async fn delete_message(&self, id: MessageId) -> Result<bool, EngineError> {
        let purged = self
            .ledger()
            .purge(id)
            .await
            .map_err(during(Operation::DeleteMessage))?;

        let removed = self
            .messages()
            .delete(id)
            .await
            .map_err(during(Operation::DeleteMessage))?;

        if removed {
            info!(message_id = %id, purged, "deleted message");
        } else {
            warn!(message_id = %id, purged, "delete target not found");
        }
        Ok(removed)
    }

    /// Prior versions of a message, most recent first.
    pub async fn fetch_history(&self, message_id: MessageId) -> Result<Vec<VersionRecord>, EngineError> {
        self.ledger()
            .history(message_id)
            .await
            .map_err(during(Operation::FetchHistory))
    }

    pub async fn message(&self, id: MessageId) -> Result<Option<Message>, EngineError> {
        self.messages().get(id).await.map_err(during(Operation::ReadMessage))
    }

    /// Reads the whole message collection and builds the tree.
    pub async fn load_tree(&self) -> Result<ConversationTree, EngineError> {
        let messages = self
            .messages()
            .read_all()
            .await
            .map_err(during(Operation::LoadTree))?;
        Ok(ConversationTree::build(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::id::{RecordId, Timestamp};
    use crate::record::Collection;
    use crate::MemoryStore;

    fn conversation() -> (Conversation<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        (Conversation::with_clock(Arc::clone(&store), clock), store)
    }

    #[tokio::test]
    async fn create_root_starts_at_version_one() {
        let (conv, store) = conversation();
        let root = conv.create_root("hi").await.unwrap().unwrap();

        assert!(root.is_root());
        assert_eq!(root.current_version, 1);
        assert_eq!(root.created_at, Timestamp::from_millis(1_000));
        assert!(conv.fetch_history(root.id).await.unwrap().is_empty());
        assert_eq!(store.row_count(Collection::MessageVersions), 0);
    }

    #[tokio::test]
    async fn blank_content_persists_nothing() {
        let (conv, store) = conversation();
        assert!(conv.create_root("").await.unwrap().is_none());
        assert!(conv.create_root("   ").await.unwrap().is_none());

        let root = conv.create_root("x").await.unwrap().unwrap();
        assert!(conv.create_branch(root.id, "").await.unwrap().is_none());
        assert!(conv.create_branch(root.id, " \n\t").await.unwrap().is_none());

        assert_eq!(store.row_count(Collection::Messages), 1);
        assert_eq!(store.row_count(Collection::MessageVersions), 0);
    }

    #[tokio::test]
    async fn branch_on_missing_parent_is_noop() {
        let (conv, store) = conversation();
        let result = conv.create_branch(RecordId::new(42), "orphan").await.unwrap();

        assert!(result.is_none());
        assert_eq!(store.row_count(Collection::Messages), 0);
        assert_eq!(store.row_count(Collection::MessageVersions), 0);
    }

    #[tokio::test]
    async fn branch_logs_on_parent_ledger() {
        let (conv, _store) = conversation();
        let root = conv.create_root("question").await.unwrap().unwrap();

        let a = conv.create_branch(root.id, "answer a").await.unwrap().unwrap();
        let b = conv.create_branch(root.id, "answer b").await.unwrap().unwrap();

        assert_eq!(a.message.parent_id, Some(root.id));
        assert_eq!(a.message.current_version, 1);
        assert_eq!(a.ledger_entry.as_ref().unwrap().version, 1);
        assert_eq!(b.ledger_entry.as_ref().unwrap().version, 2);

        let history = conv.fetch_history(root.id).await.unwrap();
        let logged: Vec<(u32, &str)> = history
            .iter()
            .map(|v| (v.version, v.content.as_str()))
            .collect();
        assert_eq!(logged, vec![(2, "answer b"), (1, "answer a")]);

        // Parent is untouched and the branch's own ledger is empty.
        assert_eq!(conv.message(root.id).await.unwrap().unwrap(), root);
        assert!(conv.fetch_history(a.message.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_records_prior_state() {
        let (conv, _store) = conversation();
        let root = conv.create_root("first").await.unwrap().unwrap();

        let edited = conv.edit_message(root.id, "second").await.unwrap().unwrap();
        assert_eq!(edited.content, "second");
        assert_eq!(edited.current_version, 2);
        assert_eq!(edited.created_at, root.created_at);

        let history = conv.fetch_history(root.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].content, "first");
    }

    #[tokio::test]
    async fn edit_missing_message_is_noop() {
        let (conv, store) = conversation();
        assert!(conv
            .edit_message(RecordId::new(9), "anything")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.row_count(Collection::MessageVersions), 0);
    }

    #[tokio::test]
    async fn delete_purges_ledger_but_not_children() {
        let (conv, store) = conversation();
        let root = conv.create_root("root").await.unwrap().unwrap();
        conv.edit_message(root.id, "root v2").await.unwrap();
        let child = conv.create_branch(root.id, "child").await.unwrap().unwrap();
        conv.edit_message(child.message.id, "child v2").await.unwrap();

        assert!(conv.delete_message(root.id).await.unwrap());

        assert!(conv.message(root.id).await.unwrap().is_none());
        assert!(conv.fetch_history(root.id).await.unwrap().is_empty());

        let survivor = conv.message(child.message.id).await.unwrap().unwrap();
        assert_eq!(survivor.parent_id, Some(root.id));
        assert_eq!(conv.fetch_history(child.message.id).await.unwrap().len(), 1);
        assert_eq!(store.row_count(Collection::MessageVersions), 1);
    }

    #[tokio::test]
    async fn delete_missing_message_reports_false() {
        let (conv, _store) = conversation();
        assert!(!conv.delete_message(RecordId::new(1)).await.unwrap());
    }

    #[test]
    fn engine_error_names_operation() {
        let err = EngineError {
            operation: Operation::EditMessage,
            source: TableError::Store {
                collection: Collection::Messages,
                source: "disk full".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "edit message failed: store failure on messages: disk full"
        );
    }
}
