//! Blob store setup

use std::sync::Arc;

use anyhow::Result;
use barkeeper_core::Config;
use barkeeper_storage::{create_blob_store, BlobStore};

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn BlobStore>> {
    tracing::info!(backend = ?config.blob_backend, "Initializing blob store...");
    let store = create_blob_store(config).await?;
    tracing::info!(
        backend = ?store.backend_type(),
        ttl_secs = config.blob_ttl().as_secs(),
        "Blob store initialized successfully"
    );
    Ok(store)
}
