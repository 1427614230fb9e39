use indexmap::IndexMap;
use std::convert::Infallible;
use std::sync::{PoisonError, RwLock};

use crate::feed::{ChangeFeed, ChangeKind, Subscription};
use crate::id::RecordId;
use crate::record::Collection;

/// A durable table store holding encoded rows in named collections.
///
/// Stores operate on raw bytes; encoding and decoding is handled by the typed
/// [`crate::Table`] layer. Each call is atomic on its own, but no call spans
/// several rows or collections transactionally.
///
/// All methods take `&self` to support stores with internal locking (e.g., RocksDB).
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns every row of the collection in creation order.
    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, Vec<u8>)>, Self::Error>;

    /// Retrieves one row, or None if not present.
    fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Appends a row and returns the id allocated for it.
    fn insert(&self, collection: Collection, value: &[u8]) -> Result<RecordId, Self::Error>;

    /// Overwrites an existing row. Returns false without writing if the row is absent.
    fn replace(&self, collection: Collection, id: RecordId, value: &[u8]) -> Result<bool, Self::Error>;

    /// Removes the given rows and returns how many existed.
    fn remove(&self, collection: Collection, ids: &[RecordId]) -> Result<usize, Self::Error>;

    /// Subscribes to change notifications for a collection.
    fn subscribe(&self, collection: Collection) -> Subscription;
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: IndexMap<RecordId, Vec<u8>>,
    last_id: u64,
}

impl MemoryTable {
    fn allocate(&mut self) -> RecordId {
        self.last_id += 1;
        RecordId::new(self.last_id)
    }
}

#[derive(Debug, Default)]
struct MemoryTables {
    messages: MemoryTable,
    versions: MemoryTable,
}

impl MemoryTables {
    fn table(&self, collection: Collection) -> &MemoryTable {
        match collection {
            Collection::Messages => &self.messages,
            Collection::MessageVersions => &self.versions,
        }
    }

    fn table_mut(&mut self, collection: Collection) -> &mut MemoryTable {
        match collection {
            Collection::Messages => &mut self.messages,
            Collection::MessageVersions => &mut self.versions,
        }
    }
}

/// An in-memory store backed by insertion-ordered maps.
///
/// Useful for testing and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose change feed buffers `capacity` events per subscriber.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::default(),
            feed: ChangeFeed::new(capacity),
        }
    }

    /// Number of rows currently held in a collection.
    pub fn row_count(&self, collection: Collection) -> usize {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.table(collection).rows.len()
    }

    /// Number of live change-feed subscriptions on a collection.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.feed.subscriber_count(collection)
    }
}

impl Store for MemoryStore {
    type Error = Infallible;

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, Vec<u8>)>, Self::Error> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .table(collection)
            .rows
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect())
    }

    fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Vec<u8>>, Self::Error> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.table(collection).rows.get(&id).cloned())
    }

    fn insert(&self, collection: Collection, value: &[u8]) -> Result<RecordId, Self::Error> {
        let id = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            let table = tables.table_mut(collection);
            let id = table.allocate();
            table.rows.insert(id, value.to_vec());
            id
        };
        self.feed.publish(collection, ChangeKind::Insert, id);
        Ok(id)
    }

    fn replace(&self, collection: Collection, id: RecordId, value: &[u8]) -> Result<bool, Self::Error> {
        let replaced = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            match tables.table_mut(collection).rows.get_mut(&id) {
                Some(row) => {
                    *row = value.to_vec();
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.feed.publish(collection, ChangeKind::Update, id);
        }
        Ok(replaced)
    }

    fn remove(&self, collection: Collection, ids: &[RecordId]) -> Result<usize, Self::Error> {
        let removed: Vec<RecordId> = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            let table = tables.table_mut(collection);
            ids.iter()
                .copied()
                .filter(|id| table.rows.shift_remove(id).is_some())
                .collect()
        };
        for id in &removed {
            self.feed.publish(collection, ChangeKind::Delete, *id);
        }
        Ok(removed.len())
    }

    fn subscribe(&self, collection: Collection) -> Subscription {
        self.feed.subscribe(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ChangeEvent, Notification};

    #[test]
    fn memory_store_insert_get() {
        let store = MemoryStore::new();
        let id = store.insert(Collection::Messages, b"hello world").unwrap();

        assert_eq!(id, RecordId::new(1));
        assert_eq!(
            store.get(Collection::Messages, id).unwrap(),
            Some(b"hello world".to_vec())
        );
    }

    #[test]
    fn memory_store_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get(Collection::Messages, RecordId::new(1)).unwrap(), None);
    }

    #[test]
    fn memory_store_ids_are_per_collection() {
        let store = MemoryStore::new();
        let m1 = store.insert(Collection::Messages, b"a").unwrap();
        let v1 = store.insert(Collection::MessageVersions, b"b").unwrap();
        let m2 = store.insert(Collection::Messages, b"c").unwrap();

        assert_eq!(m1, RecordId::new(1));
        assert_eq!(v1, RecordId::new(1));
        assert_eq!(m2, RecordId::new(2));
    }

    #[test]
    fn memory_store_ids_not_reused_after_remove() {
        let store = MemoryStore::new();
        let first = store.insert(Collection::Messages, b"a").unwrap();
        store.remove(Collection::Messages, &[first]).unwrap();
        let second = store.insert(Collection::Messages, b"b").unwrap();

        assert_eq!(second, RecordId::new(2));
    }

    #[test]
    fn memory_store_scan_keeps_creation_order() {
        let store = MemoryStore::new();
        let a = store.insert(Collection::Messages, b"a").unwrap();
        let b = store.insert(Collection::Messages, b"b").unwrap();
        let c = store.insert(Collection::Messages, b"c").unwrap();
        store.remove(Collection::Messages, &[b]).unwrap();
        store.replace(Collection::Messages, a, b"a2").unwrap();

        let rows = store.scan(Collection::Messages).unwrap();
        assert_eq!(rows, vec![(a, b"a2".to_vec()), (c, b"c".to_vec())]);
    }

    #[test]
    fn memory_store_replace_missing_is_false() {
        let store = MemoryStore::new();
        assert!(!store
            .replace(Collection::Messages, RecordId::new(5), b"x")
            .unwrap());
        assert_eq!(store.row_count(Collection::Messages), 0);
    }

    #[test]
    fn memory_store_remove_counts_existing_rows() {
        let store = MemoryStore::new();
        let a = store.insert(Collection::Messages, b"a").unwrap();
        let removed = store
            .remove(Collection::Messages, &[a, RecordId::new(99)])
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn memory_store_publishes_each_write() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Collection::Messages);

        let id = store.insert(Collection::Messages, b"a").unwrap();
        store.replace(Collection::Messages, id, b"b").unwrap();
        store.remove(Collection::Messages, &[id]).unwrap();
        store.replace(Collection::Messages, id, b"c").unwrap();

        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| sub.try_recv())
            .map(|n| match n {
                Notification::Changed(ChangeEvent { kind, .. }) => kind,
                Notification::Lagged(_) => panic!("unexpected lag"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }
}
