//! Barkeeper Storage Library
//!
//! This crate provides the blob store abstraction used to park uploaded
//! files in a key-value cache with a time-to-live, plus the Redis and
//! in-memory backends.
//!
//! # Key format
//!
//! Keys are the content hash or random token chosen by ingestion. Backends
//! may namespace them with a configured prefix (`{prefix}:{key}`); key
//! rendering is centralized in the `keys` module so backends stay consistent.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-redis")]
pub mod redis;
pub mod traits;

// Re-export commonly used types
pub use barkeeper_core::BlobBackend;
pub use factory::create_blob_store;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryBlobStore;
#[cfg(feature = "storage-redis")]
pub use redis::{RedisBlobStore, RedisConfig};
pub use traits::{BlobStore, StorageError, StorageResult};
