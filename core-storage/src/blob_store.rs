//! SQLite-backed [`BlobStore`].

use crate::StorageError;
use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::storage::BlobStore;
use bytes::Bytes;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use tracing::debug;

/// Stores capture blobs in the `blobs` table of the sync store.
#[derive(Clone)]
pub struct SqliteBlobStore {
    pool: SqlitePool,
}

impl SqliteBlobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Total bytes held locally.
    pub async fn total_size(&self) -> BridgeResult<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM blobs")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn put(&self, key: &str, blob: Bytes) -> BridgeResult<()> {
        let size = blob.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO blobs (key, data, size_bytes)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                size_bytes = excluded.size_bytes,
                stored_at = strftime('%s', 'now')
            "#,
        )
        .bind(key)
        .bind(blob.as_ref())
        .bind(size)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        debug!(key, size_bytes = size, "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        let row = sqlx::query("SELECT data FROM blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => {
                let data: Vec<u8> = row.try_get("data").map_err(StorageError::from)?;
                Ok(Some(Bytes::from(data)))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        let result = sqlx::query("DELETE FROM blobs WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        debug!(key, removed = result.rows_affected(), "Blob deleted");
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<BTreeSet<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM blobs")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(keys.into_iter().collect())
    }

    async fn contains(&self, key: &str) -> BridgeResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn store() -> SqliteBlobStore {
        SqliteBlobStore::new(create_test_pool().await.unwrap())
    }

    #[core_async::test]
    async fn test_put_then_get() {
        let store = store().await;
        store
            .put("sess-1", Bytes::from_static(b"webm-bytes"))
            .await
            .unwrap();

        let blob = store.get("sess-1").await.unwrap();
        assert_eq!(blob.as_deref(), Some(&b"webm-bytes"[..]));
    }

    #[core_async::test]
    async fn test_missing_key_is_none() {
        let store = store().await;
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(!store.contains("nope").await.unwrap());
    }

    #[core_async::test]
    async fn test_put_overwrites() {
        let store = store().await;
        store.put("sess-1", Bytes::from_static(b"first")).await.unwrap();
        store.put("sess-1", Bytes::from_static(b"second!")).await.unwrap();

        assert_eq!(
            store.get("sess-1").await.unwrap().as_deref(),
            Some(&b"second!"[..])
        );
        assert_eq!(store.list_keys().await.unwrap().len(), 1);
        assert_eq!(store.total_size().await.unwrap(), 7);
    }

    #[core_async::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        store.put("sess-1", Bytes::from_static(b"x")).await.unwrap();

        store.delete("sess-1").await.unwrap();
        store.delete("sess-1").await.unwrap();

        assert!(store.get("sess-1").await.unwrap().is_none());
    }

    #[core_async::test]
    async fn test_list_keys() {
        let store = store().await;
        for key in ["sess-b", "sess-a", "sess-c"] {
            store.put(key, Bytes::from_static(b"v")).await.unwrap();
        }

        let keys: Vec<_> = store.list_keys().await.unwrap().into_iter().collect();
        assert_eq!(keys, vec!["sess-a", "sess-b", "sess-c"]);
    }

    #[core_async::test]
    async fn test_empty_blob_round_trip() {
        let store = store().await;
        store.put("empty", Bytes::new()).await.unwrap();

        let blob = store.get("empty").await.unwrap().unwrap();
        assert!(blob.is_empty());
    }
}
