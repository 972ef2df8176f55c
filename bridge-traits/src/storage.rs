//! Local Blob Storage Abstraction
//!
//! Raw capture blobs are stashed locally under the session id so an upload
//! can be retried without re-recording.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;

use crate::error::Result;

/// Durable key-value store for video blobs.
///
/// Writes must survive a process restart. `get` on a missing key returns
/// `Ok(None)`; only storage faults are errors.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::BlobStore;
///
/// async fn stash(store: &dyn BlobStore, session_id: &str, video: Bytes) -> Result<()> {
///     store.put(session_id, video).await
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Insert or replace the blob stored under `key`.
    async fn put(&self, key: &str, blob: Bytes) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list_keys(&self) -> Result<BTreeSet<String>>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.list_keys().await?.contains(key))
    }
}
