//! RocksDB-backed store for Ramify.
//!
//! Key layout, all in the default column family:
//! - `r <tag> <id:u64 be>` holds a row, so a prefix scan yields creation order;
//! - `s <tag>` holds the last id allocated for the collection.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use ramify_core::config::{load_config, resolve_store_path};
use ramify_core::{ChangeFeed, ChangeKind, Collection, RecordId, Store, StoreConfig, Subscription};
use rocksdb::{DB, Direction, IteratorMode, Options, WriteBatch};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RocksError {
    #[error("RocksDB error: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("corrupt {what} in {collection}")]
    Corrupt {
        collection: Collection,
        what: &'static str,
    },
}

const ROW: u8 = b'r';
const SEQ: u8 = b's';

fn tag(collection: Collection) -> u8 {
    match collection {
        Collection::Messages => b'm',
        Collection::MessageVersions => b'v',
    }
}

fn row_prefix(collection: Collection) -> [u8; 2] {
    [ROW, tag(collection)]
}

fn row_key(collection: Collection, id: RecordId) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[..2].copy_from_slice(&row_prefix(collection));
    key[2..].copy_from_slice(&id.to_be_bytes());
    key
}

fn seq_key(collection: Collection) -> [u8; 2] {
    [SEQ, tag(collection)]
}

/// A persistent store backed by RocksDB.
pub struct RocksStore {
    db: DB,
    /// Serializes writes so id allocation and existence checks are atomic.
    write_lock: Mutex<()>,
    feed: ChangeFeed,
}

impl RocksStore {
    /// Opens a RocksDB store at the given path.
    ///
    /// Creates the database if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RocksError> {
        Self::open_with_capacity(path, ChangeFeed::DEFAULT_CAPACITY)
    }

    /// Opens the store described by the user's config file
    /// (`<config_dir>/ramify/config.toml`), or the defaults if there is none.
    pub fn open_default() -> Result<Self, RocksError> {
        Self::from_config(&load_config().store)
    }

    /// Opens the store at the configured location (see [`resolve_store_path`]).
    pub fn from_config(config: &StoreConfig) -> Result<Self, RocksError> {
        Self::open_configured(resolve_store_path(None, config), config)
    }

    fn open_configured(path: PathBuf, config: &StoreConfig) -> Result<Self, RocksError> {
        if let Some(parent) = path.parent() {
            // RocksDB creates the leaf directory but not its parents.
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "could not create store directory");
            }
        }
        Self::open_with_capacity(path, config.feed_capacity)
    }

    fn open_with_capacity(path: impl AsRef<Path>, feed_capacity: usize) -> Result<Self, RocksError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "opened rocks store");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            feed: ChangeFeed::new(feed_capacity),
        })
    }

    fn last_id(&self, collection: Collection) -> Result<u64, RocksError> {
        match self.db.get_pinned(seq_key(collection))? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes[..].try_into().map_err(|_| RocksError::Corrupt {
                    collection,
                    what: "id sequence",
                })?;
                Ok(u64::from_be_bytes(raw))
            }
        }
    }
}

impl Store for RocksStore {
    type Error = RocksError;

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, Vec<u8>)>, Self::Error> {
        let prefix = row_prefix(collection);
        let mut rows = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(&prefix[..], Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix[..]) {
                break;
            }
            let raw: [u8; 8] = key[prefix.len()..].try_into().map_err(|_| RocksError::Corrupt {
                collection,
                what: "row key",
            })?;
            rows.push((RecordId::from_be_bytes(raw), value.into_vec()));
        }
        Ok(rows)
    }

    fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.db.get(row_key(collection, id))?)
    }

    fn insert(&self, collection: Collection, value: &[u8]) -> Result<RecordId, Self::Error> {
        let id = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let id = RecordId::new(self.last_id(collection)? + 1);
            let mut batch = WriteBatch::default();
            batch.put(seq_key(collection), id.to_be_bytes());
            batch.put(row_key(collection, id), value);
            self.db.write(batch)?;
            id
        };
        self.feed.publish(collection, ChangeKind::Insert, id);
        Ok(id)
    }

    fn replace(&self, collection: Collection, id: RecordId, value: &[u8]) -> Result<bool, Self::Error> {
        let key = row_key(collection, id);
        {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if self.db.get_pinned(key)?.is_none() {
                return Ok(false);
            }
            self.db.put(key, value)?;
        }
        self.feed.publish(collection, ChangeKind::Update, id);
        Ok(true)
    }

    fn remove(&self, collection: Collection, ids: &[RecordId]) -> Result<usize, Self::Error> {
        let mut removed = Vec::with_capacity(ids.len());
        {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut batch = WriteBatch::default();
            for id in ids {
                let key = row_key(collection, *id);
                if self.db.get_pinned(key)?.is_some() && !removed.contains(id) {
                    batch.delete(key);
                    removed.push(*id);
                }
            }
            if !removed.is_empty() {
                self.db.write(batch)?;
            }
        }
        for id in &removed {
            self.feed.publish(collection, ChangeKind::Delete, *id);
        }
        Ok(removed.len())
    }

    fn subscribe(&self, collection: Collection) -> Subscription {
        self.feed.subscribe(collection)
    }
}
