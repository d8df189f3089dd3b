//! Barkeeper Core Library
//!
//! This crate provides the domain models, error taxonomy, upload policy and
//! configuration shared by every Barkeeper component.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, ParserLimits};
pub use error::{ErrorCategory, ErrorMetadata, IngestError, LimitOrigin, LogLevel};
pub use models::{
    AcceptedFile, FieldRule, FileLimits, IngestionOutcome, MimeMatch, ResolvedPolicy,
    ResolvedRule, UploadPolicy, JSON_MIMETYPE,
};
pub use storage_types::{BlobBackend, BlobEncoding, IdentityMode};
