use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::keys::render_key;
use crate::traits::{BlobStore, StorageResult};
use crate::BlobBackend;

struct Entry {
    value: BytesMut,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process blob store with TTL expiry.
///
/// Mirrors the Redis semantics the ingestion pipeline relies on (`SET EX`
/// replaces value and expiry, `APPEND` keeps the expiry). Expired entries are
/// evicted lazily on access.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    prefix: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            entries: Arc::default(),
            prefix: Some(prefix.into()),
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of `key`, if it exists and has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(&render_key(self.prefix.as_deref(), key))
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StorageResult<()> {
        let size = value.len();
        let mut entries = self.entries.lock().await;
        entries.insert(
            render_key(self.prefix.as_deref(), key),
            Entry {
                value: BytesMut::from(&value[..]),
                expires_at: Some(Instant::now() + ttl),
            },
        );

        tracing::debug!(key = %key, size_bytes = size, ttl_secs = ttl.as_secs(), "Memory blob stored");
        Ok(())
    }

    async fn append(&self, key: &str, chunk: Bytes) -> StorageResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let full_key = render_key(self.prefix.as_deref(), key);

        match entries.get_mut(&full_key) {
            Some(entry) if !entry.is_expired(now) => entry.value.extend_from_slice(&chunk),
            _ => {
                entries.insert(
                    full_key,
                    Entry {
                        value: BytesMut::from(&chunk[..]),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let full_key = render_key(self.prefix.as_deref(), key);

        let expired = match entries.get(&full_key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(&full_key);
            return Ok(None);
        }
        Ok(entries.get(&full_key).map(|e| e.value.clone().freeze()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(&render_key(self.prefix.as_deref(), key))
            .is_some())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    fn backend_type(&self) -> BlobBackend {
        BlobBackend::Memory
    }
}
