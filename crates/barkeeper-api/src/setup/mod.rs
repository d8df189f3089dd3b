//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use barkeeper_core::{Config, UploadPolicy};

use crate::services::{IngestSettings, ReqwestFetcher};
use crate::state::{AppState, UploadState};

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    crate::telemetry::init_telemetry()
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");

    let store = storage::setup_storage(&config).await?;
    let policy = load_upload_policy(&config).await?;

    let fetcher = ReqwestFetcher::new(config.fetch_timeout)
        .context("Failed to create remote fetcher")?;
    let uploads = UploadState::new(
        store.clone(),
        Arc::new(fetcher),
        &policy,
        IngestSettings::from_config(&config),
    )?;

    let state = Arc::new(AppState {
        store,
        uploads: Arc::new(uploads),
    });

    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}

/// Read the upload policy from `UPLOAD_POLICY_PATH`, or accept everything
/// when none is configured.
async fn load_upload_policy(config: &Config) -> Result<UploadPolicy> {
    let Some(path) = config.upload_policy_path() else {
        tracing::warn!("UPLOAD_POLICY_PATH not set, accepting any field and mimetype");
        return Ok(UploadPolicy::default());
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read upload policy from {}", path))?;
    let policy = UploadPolicy::from_json(&raw)?;

    tracing::info!(
        path,
        fields = policy.enabled_fields.len(),
        additional_fields = policy.enabled_additional_fields,
        "Upload policy loaded"
    );
    Ok(policy)
}
