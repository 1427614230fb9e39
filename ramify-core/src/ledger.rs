use crate::async_store::AsyncStore;
use crate::id::{MessageId, Timestamp};
use crate::record::{VersionBody, VersionRecord};
use crate::table::{Table, TableError};

/// Append-only history of prior contents, per message.
///
/// Entries are written by edits (the superseded content) and by branching
/// (the branch content, logged against the parent). They are never updated
/// and are removed only together with their message.
pub struct Ledger<'a, S> {
    table: Table<'a, S, VersionRecord>,
}

impl<'a, S: AsyncStore> Ledger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Ledger {
            table: Table::new(store),
        }
    }

    /// Entries for one message in write order.
    pub async fn entries(&self, message_id: MessageId) -> Result<Vec<VersionRecord>, TableError> {
        let mut all = self.table.read_all().await?;
        all.retain(|v| v.message_id == message_id);
        Ok(all)
    }

    /// Highest recorded version, or 0 for an empty ledger.
    pub async fn latest_version(&self, message_id: MessageId) -> Result<u32, TableError> {
        Ok(self
            .entries(message_id)
            .await?
            .iter()
            .map(|v| v.version)
            .max()
            .unwrap_or(0))
    }

    /// Entries ordered most recent first: by version descending, then by
    /// record id descending so a later write of the same number comes first.
    pub async fn history(&self, message_id: MessageId) -> Result<Vec<VersionRecord>, TableError> {
        let mut entries = self.entries(message_id).await?;
        entries.sort_by(|a, b| b.version.cmp(&a.version).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    pub async fn append(
        &self,
        message_id: MessageId,
        content: String,
        version: u32,
        created_at: Timestamp,
    ) -> Result<VersionRecord, TableError> {
        self.table
            .insert(VersionBody {
                message_id,
                content,
                version,
                created_at,
            })
            .await
    }

    /// Removes every entry of the message and returns how many there were.
    pub async fn purge(&self, message_id: MessageId) -> Result<usize, TableError> {
        self.table.delete_where(|v| v.message_id == message_id).await
    }
}
