use std::sync::Arc;

use anyhow::Context;
use barkeeper_core::{ResolvedPolicy, UploadPolicy};
use barkeeper_processing::{ContentSniffer, FieldPolicyValidator, InferSniffer};
use barkeeper_storage::BlobStore;

use crate::services::{IngestSettings, RemoteFetcher};

/// Everything one upload route needs to ingest a request body.
///
/// Built once per route and shared read-only across requests.
#[derive(Clone)]
pub struct UploadState {
    pub store: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub sniffer: Arc<dyn ContentSniffer>,
    pub policy: Arc<ResolvedPolicy>,
    pub settings: IngestSettings,
}

impl UploadState {
    /// Resolve `policy` and assemble the upload state with the default
    /// content sniffer.
    pub fn new(
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn RemoteFetcher>,
        policy: &UploadPolicy,
        settings: IngestSettings,
    ) -> anyhow::Result<Self> {
        let policy = policy.resolve().context("Invalid upload policy")?;

        Ok(Self {
            store,
            fetcher,
            sniffer: Arc::new(InferSniffer),
            policy: Arc::new(policy),
            settings,
        })
    }

    pub fn validator(&self) -> FieldPolicyValidator {
        FieldPolicyValidator::new(Arc::clone(&self.policy))
    }
}

/// Application-wide state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub uploads: Arc<UploadState>,
}
