//! Request-body ingestion.
//!
//! `router` picks the ingestion mode from the request headers. Multipart
//! bodies run through the `machine` state machine, fed by the
//! `multipart_source` reader task and executed by the `driver`. JSON bodies
//! are handled in one shot by `json`.

pub mod driver;
pub mod json;
pub mod machine;
pub mod multipart_source;
pub mod router;

use std::time::Duration;

use barkeeper_core::{BlobEncoding, Config, IdentityMode, ParserLimits};

pub use machine::{Command, IngestEvent, IngestionMachine, PartEvent, PartId, Phase, WriteTicket};
pub use router::{route, IngestMode};

/// Per-deployment ingestion settings, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub identity_mode: IdentityMode,
    pub blob_encoding: BlobEncoding,
    pub blob_ttl: Duration,
    pub streaming_append: bool,
    pub parser_limits: ParserLimits,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            identity_mode: config.identity_mode,
            blob_encoding: config.blob_encoding,
            blob_ttl: config.blob_ttl(),
            streaming_append: config.streaming_append,
            parser_limits: config.parser_limits().clone(),
        }
    }

    /// Whether file parts are written chunk by chunk instead of buffered.
    ///
    /// Only possible with token identity: a content hash is not known
    /// until the last byte has arrived.
    pub fn appends_chunks(&self) -> bool {
        self.streaming_append && self.identity_mode == IdentityMode::Token
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
