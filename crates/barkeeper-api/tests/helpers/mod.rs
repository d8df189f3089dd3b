//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p barkeeper-api`.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use barkeeper_api::services::{FetchError, IngestSettings, RemoteFetcher, ReqwestFetcher};
use barkeeper_api::setup::routes;
use barkeeper_api::state::{AppState, UploadState};
use barkeeper_core::{BlobBackend, Config, UploadPolicy};
use barkeeper_storage::{BlobStore, MemoryBlobStore, StorageError, StorageResult};
use bytes::Bytes;

/// Test application: server plus a handle on the blob store behind it.
pub struct TestApp {
    pub server: TestServer,
    pub store: MemoryBlobStore,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Stored value under `key`, as text.
    pub async fn stored(&self, key: &str) -> Option<String> {
        self.store
            .get(key)
            .await
            .expect("memory store read")
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }
}

/// Setup a test app with an in-memory store and default settings.
pub async fn setup_test_app(policy: UploadPolicy) -> TestApp {
    setup_test_app_with(policy, IngestSettings::default()).await
}

pub async fn setup_test_app_with(policy: UploadPolicy, settings: IngestSettings) -> TestApp {
    let fetcher = ReqwestFetcher::new(Duration::from_secs(5)).expect("reqwest client");
    let store = MemoryBlobStore::new();
    let server = build_server(Arc::new(store.clone()), Arc::new(fetcher), policy, settings);
    TestApp { server, store }
}

/// Server whose blob store fails every write.
pub fn setup_failing_store_app(policy: UploadPolicy) -> TestServer {
    let fetcher = ReqwestFetcher::new(Duration::from_secs(5)).expect("reqwest client");
    build_server(
        Arc::new(FailingBlobStore),
        Arc::new(fetcher),
        policy,
        IngestSettings::default(),
    )
}

/// Server with canned remote files instead of real downloads.
pub async fn setup_static_fetch_app(
    policy: UploadPolicy,
    files: HashMap<String, Bytes>,
) -> TestApp {
    let store = MemoryBlobStore::new();
    let server = build_server(
        Arc::new(store.clone()),
        Arc::new(StaticFetcher { files }),
        policy,
        IngestSettings::default(),
    );
    TestApp { server, store }
}

pub fn build_server(
    store: Arc<dyn BlobStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    policy: UploadPolicy,
    settings: IngestSettings,
) -> TestServer {
    let config = Config {
        parser_limits: settings.parser_limits.clone(),
        ..Config::default()
    };
    let uploads = UploadState::new(store.clone(), fetcher, &policy, settings)
        .expect("valid upload policy");
    let state = Arc::new(AppState {
        store,
        uploads: Arc::new(uploads),
    });

    let app = routes::setup_routes(&config, state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Blob store that rejects every operation.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, _key: &str, _value: Bytes, _ttl: Duration) -> StorageResult<()> {
        Err(StorageError::WriteFailed("connection refused".to_string()))
    }

    async fn append(&self, _key: &str, _chunk: Bytes) -> StorageResult<()> {
        Err(StorageError::WriteFailed("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
        Err(StorageError::ReadFailed("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::DeleteFailed("connection refused".to_string()))
    }

    async fn ping(&self) -> StorageResult<()> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    fn backend_type(&self) -> BlobBackend {
        BlobBackend::Redis
    }
}

struct StaticFetcher {
    files: HashMap<String, Bytes>,
}

#[async_trait]
impl RemoteFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.files.get(url).cloned().ok_or(FetchError::Status {
            status: 404,
            body: Some("not found".to_string()),
        })
    }
}
