#[cfg(feature = "storage-memory")]
use crate::MemoryBlobStore;
#[cfg(feature = "storage-redis")]
use crate::{RedisBlobStore, RedisConfig};
use crate::{BlobBackend, BlobStore, StorageResult};
use barkeeper_core::Config;
use std::sync::Arc;

/// Create a blob store backend based on configuration
pub async fn create_blob_store(config: &Config) -> StorageResult<Arc<dyn BlobStore>> {
    match config.blob_backend {
        #[cfg(feature = "storage-redis")]
        BlobBackend::Redis => {
            let redis_config = RedisConfig {
                url: config.redis_url.clone(),
                prefix: config.redis_key_prefix.clone(),
                pool_size: config.redis_pool_size,
                connection_timeout: config.redis_connection_timeout,
            };

            let store = RedisBlobStore::new(&redis_config)?;
            store.ping().await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-redis"))]
        BlobBackend::Redis => Err(crate::StorageError::ConfigError(
            "Redis blob backend not available (storage-redis feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        BlobBackend::Memory => {
            let store = match &config.redis_key_prefix {
                Some(prefix) => MemoryBlobStore::with_prefix(prefix.clone()),
                None => MemoryBlobStore::new(),
            };
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-memory"))]
        BlobBackend::Memory => Err(crate::StorageError::ConfigError(
            "Memory blob backend not available (storage-memory feature not enabled)".to_string(),
        )),
    }
}
