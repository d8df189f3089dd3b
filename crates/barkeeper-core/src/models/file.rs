//! Accepted file metadata and the terminal ingestion outcome.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Metadata of one file accepted during ingestion.
///
/// The bytes themselves live in the blob store under `key`; this record is
/// what downstream handlers receive. Field names on the wire match the
/// format consumers of the cache already read (`fieldname`, `mimetype`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedFile {
    pub key: String,
    #[serde(rename = "fieldname")]
    pub field_name: String,
    #[serde(rename = "name")]
    pub original_name: String,
    pub encoding: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    #[serde(rename = "ext", skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Exactly one of these is produced per request-ingestion lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    Success(Vec<AcceptedFile>),
    Failure(IngestError),
}

impl IngestionOutcome {
    pub fn into_result(self) -> Result<Vec<AcceptedFile>, IngestError> {
        match self {
            IngestionOutcome::Success(files) => Ok(files),
            IngestionOutcome::Failure(err) => Err(err),
        }
    }
}

impl From<Result<Vec<AcceptedFile>, IngestError>> for IngestionOutcome {
    fn from(result: Result<Vec<AcceptedFile>, IngestError>) -> Self {
        match result {
            Ok(files) => IngestionOutcome::Success(files),
            Err(err) => IngestionOutcome::Failure(err),
        }
    }
}
