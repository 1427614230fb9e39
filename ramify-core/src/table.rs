use std::marker::PhantomData;

use crate::async_store::AsyncStore;
use crate::id::RecordId;
use crate::record::{CodecError, Collection, Record};

/// Error type for typed table operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("store failure on {collection}: {source}")]
    Store {
        collection: Collection,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TableError {
    fn store<E: std::error::Error + Send + Sync + 'static>(collection: Collection, err: E) -> Self {
        TableError::Store {
            collection,
            source: Box::new(err),
        }
    }
}

/// Typed view of one collection of a store.
///
/// Encodes and decodes rows of `R`; every method is a single store call
/// except `update` (read, then replace) and `delete_where` (scan, then remove).
pub struct Table<'a, S, R> {
    store: &'a S,
    _record: PhantomData<fn() -> R>,
}

impl<'a, S: AsyncStore, R: Record> Table<'a, S, R> {
    pub fn new(store: &'a S) -> Self {
        Table {
            store,
            _record: PhantomData,
        }
    }

    /// Reads every row in creation order.
    pub async fn read_all(&self) -> Result<Vec<R>, TableError> {
        let rows = self
            .store
            .async_scan(R::COLLECTION)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?;
        rows.into_iter()
            .map(|(id, bytes)| Ok(R::from_row(id, R::decode(id, &bytes)?)))
            .collect()
    }

    pub async fn get(&self, id: RecordId) -> Result<Option<R>, TableError> {
        let bytes = self
            .store
            .async_get(R::COLLECTION, id)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?;
        match bytes {
            Some(bytes) => Ok(Some(R::from_row(id, R::decode(id, &bytes)?))),
            None => Ok(None),
        }
    }

    /// Inserts a new row and returns it with its allocated id.
    pub async fn insert(&self, body: R::Body) -> Result<R, TableError> {
        let bytes = R::encode(&body)?;
        let id = self
            .store
            .async_insert(R::COLLECTION, &bytes)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?;
        Ok(R::from_row(id, body))
    }

    /// Applies a partial update. Returns `None` if the row does not exist
    /// (including when it disappears between the read and the write).
    pub async fn update(&self, id: RecordId, patch: R::Patch) -> Result<Option<R>, TableError> {
        let Some(bytes) = self
            .store
            .async_get(R::COLLECTION, id)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?
        else {
            return Ok(None);
        };

        let mut body = R::decode(id, &bytes)?;
        R::apply(&mut body, patch);
        let bytes = R::encode(&body)?;

        let replaced = self
            .store
            .async_replace(R::COLLECTION, id, &bytes)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?;
        Ok(replaced.then(|| R::from_row(id, body)))
    }

    /// Removes one row. Returns whether it existed.
    pub async fn delete(&self, id: RecordId) -> Result<bool, TableError> {
        let removed = self
            .store
            .async_remove(R::COLLECTION, &[id])
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))?;
        Ok(removed > 0)
    }

    /// Removes every row matching the predicate and returns how many were removed.
    pub async fn delete_where<F>(&self, predicate: F) -> Result<usize, TableError>
    where
        F: Fn(&R) -> bool,
    {
        let ids: Vec<RecordId> = self
            .read_all()
            .await?
            .iter()
            .filter(|row| predicate(row))
            .map(|row| row.id())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.store
            .async_remove(R::COLLECTION, &ids)
            .await
            .map_err(|e| TableError::store(R::COLLECTION, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Timestamp;
    use crate::record::{Message, MessageBody, MessagePatch, VersionBody, VersionRecord};
    use crate::MemoryStore;

    fn message(content: &str) -> MessageBody {
        MessageBody {
            content: content.to_string(),
            parent_id: None,
            current_version: 1,
            created_at: Timestamp::from_millis(10),
        }
    }

    #[tokio::test]
    async fn insert_then_read_all() {
        let store = MemoryStore::new();
        let table: Table<_, Message> = Table::new(&store);

        let a = table.insert(message("a")).await.unwrap();
        let b = table.insert(message("b")).await.unwrap();

        let all = table.read_all().await.unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[tokio::test]
    async fn update_applies_patch() {
        let store = MemoryStore::new();
        let table: Table<_, Message> = Table::new(&store);
        let a = table.insert(message("a")).await.unwrap();

        let updated = table
            .update(
                a.id,
                MessagePatch {
                    content: Some("a2".to_string()),
                    current_version: Some(2),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.content, "a2");
        assert_eq!(updated.current_version, 2);
        assert_eq!(updated.created_at, a.created_at);
        assert_eq!(table.get(a.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn update_missing_row_is_none() {
        let store = MemoryStore::new();
        let table: Table<_, Message> = Table::new(&store);
        let result = table
            .update(RecordId::new(3), MessagePatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_where_filters() {
        let store = MemoryStore::new();
        let table: Table<_, VersionRecord> = Table::new(&store);
        for (owner, version) in [(1, 1), (2, 1), (1, 2)] {
            table
                .insert(VersionBody {
                    message_id: RecordId::new(owner),
                    content: format!("{owner}:{version}"),
                    version,
                    created_at: Timestamp::from_millis(0),
                })
                .await
                .unwrap();
        }

        let removed = table
            .delete_where(|v| v.message_id == RecordId::new(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let left = table.read_all().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message_id, RecordId::new(2));

        assert_eq!(table.delete_where(|_| false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_row_surfaces_codec_error() {
        use crate::Store;

        let store = MemoryStore::new();
        store.insert(Collection::Messages, b"\xff").unwrap();
        let table: Table<_, Message> = Table::new(&store);

        let err = table.read_all().await.unwrap_err();
        assert!(matches!(err, TableError::Codec(CodecError::Decode { .. })));
    }
}
