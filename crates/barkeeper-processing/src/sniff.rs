//! Magic-byte content sniffing.

/// Mimetype reported when the content type cannot be detected.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Detected content type of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub mime: String,
    pub extension: String,
}

/// Detects a content type from the leading bytes of a file.
pub trait ContentSniffer: Send + Sync {
    /// Returns `None` when the content is not recognized.
    fn sniff(&self, data: &[u8]) -> Option<SniffResult>;
}

/// Sniffer backed by the `infer` magic-number tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferSniffer;

impl ContentSniffer for InferSniffer {
    fn sniff(&self, data: &[u8]) -> Option<SniffResult> {
        infer::get(data).map(|kind| SniffResult {
            mime: kind.mime_type().to_string(),
            extension: kind.extension().to_string(),
        })
    }
}
