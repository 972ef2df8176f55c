//! Durability of the sync store across a process restart, simulated by
//! closing the pool and reopening the same file.

use bridge_traits::storage::BlobStore;
use bytes::Bytes;
use core_storage::{create_pool, schema_version, DatabaseConfig, SqliteBlobStore, SCHEMA_VERSION};

#[core_async::test]
async fn blobs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.db");

    let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
    let store = SqliteBlobStore::new(pool.clone());
    store
        .put("sess-1", Bytes::from(vec![7u8; 64 * 1024]))
        .await
        .unwrap();
    pool.close().await;

    let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
    let store = SqliteBlobStore::new(pool);

    let blob = store.get("sess-1").await.unwrap().expect("blob persisted");
    assert_eq!(blob.len(), 64 * 1024);
    assert!(blob.iter().all(|b| *b == 7));
}

#[core_async::test]
async fn incompatible_store_is_recreated_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.db");

    let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
    SqliteBlobStore::new(pool.clone())
        .put("stale", Bytes::from_static(b"old"))
        .await
        .unwrap();
    sqlx::query("PRAGMA user_version = 42")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();

    assert_eq!(schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
    let store = SqliteBlobStore::new(pool);
    assert!(store.list_keys().await.unwrap().is_empty());
}
