//! Ramify keeps a conversation that can fork at any message, with an edit
//! history for every message.
//!
//! Core concepts:
//! - **Message**: a node with content, an optional parent and a version counter
//! - **Ledger**: the append-only record of a message's prior contents
//! - **Store**: a table store of encoded rows with a change feed
//! - **ConversationTree**: the parent/children structure rebuilt from one read
//! - **Conversation**: the branch/edit/delete API over a store
//! - **SyncCoordinator**: rebuilds the tree on every change notification
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ramify_core::{Conversation, MemoryStore};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let conversation = Conversation::new(Arc::new(MemoryStore::new()));
//!
//! let root = conversation.create_root("hi").await?.unwrap();
//! conversation.edit_message(root.id, "hello").await?;
//! conversation.create_branch(root.id, "another take").await?;
//!
//! let tree = conversation.load_tree().await?;
//! assert_eq!(tree.children(root.id).count(), 1);
//! assert_eq!(conversation.fetch_history(root.id).await?.len(), 2);
//! # Ok::<(), ramify_core::EngineError>(())
//! # }).unwrap();
//! ```

mod async_store;
mod clock;
pub mod config;
mod engine;
mod feed;
mod id;
mod ledger;
mod record;
mod store;
mod sync;
mod table;
mod tree;

pub use async_store::AsyncStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, StoreConfig, SyncConfig};
pub use engine::{Branch, Conversation, EngineError, Operation};
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, Notification, Subscription};
pub use id::{MessageId, RecordId, Timestamp, VersionId};
pub use ledger::Ledger;
pub use record::{
    CodecError, Collection, Message, MessageBody, MessagePatch, Record, VersionBody, VersionRecord,
};
pub use store::{MemoryStore, Store};
pub use sync::{Snapshot, SyncCoordinator, SyncHandle};
pub use table::{Table, TableError};
pub use tree::{ConversationTree, FlatNode, TreeError};
