use std::future::Future;

use crate::feed::Subscription;
use crate::id::RecordId;
use crate::record::Collection;
use crate::store::Store;

/// Async table store.
///
/// Mirrors the `Store` trait but with async methods, enabling network-backed
/// implementations. Methods are prefixed with `async_` to avoid name
/// collisions when a type implements both `Store` and `AsyncStore`.
pub trait AsyncStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn async_scan(
        &self,
        collection: Collection,
    ) -> impl Future<Output = Result<Vec<(RecordId, Vec<u8>)>, Self::Error>> + Send;

    fn async_get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    fn async_insert(
        &self,
        collection: Collection,
        value: &[u8],
    ) -> impl Future<Output = Result<RecordId, Self::Error>> + Send;

    fn async_replace(
        &self,
        collection: Collection,
        id: RecordId,
        value: &[u8],
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn async_remove(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Subscribes to change notifications. Subscribing never touches the backing store.
    fn async_subscribe(&self, collection: Collection) -> Subscription;
}

/// Blanket impl: any sync `Store` is also an `AsyncStore`.
impl<S: Store + Send + Sync> AsyncStore for S {
    type Error = S::Error;

    async fn async_scan(&self, collection: Collection) -> Result<Vec<(RecordId, Vec<u8>)>, Self::Error> {
        self.scan(collection)
    }

    async fn async_get(&self, collection: Collection, id: RecordId) -> Result<Option<Vec<u8>>, Self::Error> {
        self.get(collection, id)
    }

    async fn async_insert(&self, collection: Collection, value: &[u8]) -> Result<RecordId, Self::Error> {
        self.insert(collection, value)
    }

    async fn async_replace(
        &self,
        collection: Collection,
        id: RecordId,
        value: &[u8],
    ) -> Result<bool, Self::Error> {
        self.replace(collection, id, value)
    }

    async fn async_remove(&self, collection: Collection, ids: &[RecordId]) -> Result<usize, Self::Error> {
        self.remove(collection, ids)
    }

    fn async_subscribe(&self, collection: Collection) -> Subscription {
        self.subscribe(collection)
    }
}
