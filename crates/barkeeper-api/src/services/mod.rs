//! Ingestion services used by the upload middleware.

pub mod fetch;
pub mod ingest;

pub use fetch::{FetchError, RemoteFetcher, ReqwestFetcher};
pub use ingest::{IngestMode, IngestSettings};
