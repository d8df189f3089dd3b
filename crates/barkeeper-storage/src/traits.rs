//! Blob store abstraction trait
//!
//! This module defines the BlobStore trait that all cache backends must implement.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::BlobBackend;

/// Blob store operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for blob store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Blob store abstraction trait
///
/// Wraps an external key-value cache. Values written with `put` expire after
/// `ttl`; `append` extends an existing value and keeps its expiry. Timeouts
/// and retries, if any, belong to the implementation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Atomically write `value` under `key`, replacing any previous value,
    /// with the given time-to-live (`SET key value EX ttl`).
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StorageResult<()>;

    /// Append `chunk` to the value under `key` (`APPEND key chunk`).
    ///
    /// Appending to a missing key creates it without an expiry, so callers
    /// start a streamed value with `put`.
    async fn append(&self, key: &str, chunk: Bytes) -> StorageResult<()>;

    /// Read the value under `key`, if present and not expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Delete the value under `key`. Returns whether a value was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StorageResult<()>;

    /// Get the blob backend type
    fn backend_type(&self) -> BlobBackend;
}
