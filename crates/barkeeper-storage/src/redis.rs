//! Redis blob store backend

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use crate::keys::render_key;
use crate::traits::{BlobStore, StorageError, StorageResult};
use crate::BlobBackend;

/// Connection settings for the Redis blob store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,

    /// Optional namespace prepended to every key as `{prefix}:`.
    pub prefix: Option<String>,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            prefix: None,
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// Redis-backed implementation of [`BlobStore`].
///
/// Values are plain Redis strings written with `SET .. EX` and extended
/// with `APPEND`.
pub struct RedisBlobStore {
    pool: Pool,
    prefix: Option<String>,
}

impl RedisBlobStore {
    /// Create a new `RedisBlobStore` from the provided configuration.
    ///
    /// The pool connects lazily; call [`BlobStore::ping`] to verify the
    /// server is reachable.
    pub fn new(config: &RedisConfig) -> StorageResult<Self> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StorageError::ConfigError(e.to_string()))?
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!(
            pool_size = config.pool_size,
            prefix = ?config.prefix,
            "Redis blob store initialized"
        );

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        render_key(self.prefix.as_deref(), key)
    }

    async fn conn(&self) -> StorageResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

/// `EX` takes whole seconds; sub-second remainders round up so a value
/// never expires earlier than asked.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StorageResult<()> {
        let redis_key = self.key(key);
        let mut conn = self.conn().await?;

        let _: () = conn
            .set_ex(&redis_key, value.as_ref(), ttl_seconds(ttl))
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        tracing::debug!(
            key = %redis_key,
            size_bytes = value.len(),
            ttl_secs = ttl_seconds(ttl),
            "Blob stored in Redis"
        );
        Ok(())
    }

    async fn append(&self, key: &str, chunk: Bytes) -> StorageResult<()> {
        let redis_key = self.key(key);
        let mut conn = self.conn().await?;

        let _: i64 = conn
            .append(&redis_key, chunk.as_ref())
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let redis_key = self.key(key);
        let mut conn = self.conn().await?;

        let value: Option<Vec<u8>> = conn
            .get(&redis_key)
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        Ok(value.map(Bytes::from))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let redis_key = self.key(key);
        let mut conn = self.conn().await?;

        let removed: i64 = conn
            .del(&redis_key)
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> StorageResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    fn backend_type(&self) -> BlobBackend {
        BlobBackend::Redis
    }
}
