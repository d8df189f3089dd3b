//! Barkeeper API Library
//!
//! HTTP upload ingestion: the upload middleware and its ingestion pipeline,
//! error rendering, and application setup.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use middleware::{upload_middleware, UploadedFiles};
pub use services::{IngestSettings, RemoteFetcher, ReqwestFetcher};
pub use state::{AppState, UploadState};
