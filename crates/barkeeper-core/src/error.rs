//! Error types module
//!
//! Every failure of an ingestion lifecycle is funneled into a single
//! `IngestError`. The variants follow the upload taxonomy: policy rejections,
//! resource limits, upstream failures and protocol failures. Each variant
//! self-describes its HTTP presentation through `ErrorMetadata`.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like policy rejections
    Debug,
    /// Warning level - for limit overages and protocol problems
    Warn,
    /// Error level - for upstream failures
    Error,
}

/// Coarse grouping of ingestion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    PolicyRejection,
    ResourceLimitExceeded,
    UpstreamFailure,
    ProtocolFailure,
}

/// Where a file-count ceiling came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOrigin {
    /// Per-field or global `limits.files` of the upload policy.
    Policy,
    /// Hard cap of the multipart parser.
    Parser,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "UNEXPECTED_FIELD")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    #[error("Unsupported mimetype: {0}")]
    UnsupportedMimetype(String),

    #[error("Too many files: {message}")]
    TooManyFiles {
        message: String,
        origin: LimitOrigin,
    },

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Too many parts: {0}")]
    TooManyParts(String),

    #[error("Too many fields: {0}")]
    TooManyFields(String),

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Remote fetch failed: {message}")]
    RemoteFetchFailed {
        url: String,
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn ingest_error_static_metadata(
    err: &IngestError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        IngestError::UnexpectedField(_) => (
            422,
            "UNEXPECTED_FIELD",
            false,
            Some("Send files only under the expected field names"),
            false,
            LogLevel::Debug,
        ),
        IngestError::UnsupportedMimetype(_) => (
            422,
            "UNSUPPORTED_MIMETYPE",
            false,
            Some("Upload a file of one of the accepted types"),
            false,
            LogLevel::Debug,
        ),
        IngestError::TooManyFiles {
            origin: LimitOrigin::Policy,
            ..
        } => (
            422,
            "TOO_MANY_FILES",
            false,
            Some("Reduce the number of files sent for this field"),
            false,
            LogLevel::Debug,
        ),
        IngestError::TooManyFiles {
            origin: LimitOrigin::Parser,
            ..
        } => (
            413,
            "LIMIT_FILE_COUNT",
            false,
            Some("Reduce the number of files in the request"),
            false,
            LogLevel::Warn,
        ),
        IngestError::FileTooLarge(_) => (
            413,
            "LIMIT_FILE_SIZE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Warn,
        ),
        IngestError::TooManyParts(_) => (
            413,
            "LIMIT_PART_COUNT",
            false,
            Some("Reduce the number of parts in the request"),
            false,
            LogLevel::Warn,
        ),
        IngestError::TooManyFields(_) => (
            413,
            "LIMIT_FIELD_COUNT",
            false,
            Some("Reduce the number of fields in the request"),
            false,
            LogLevel::Warn,
        ),
        IngestError::MalformedUpload(_) => (
            400,
            "MALFORMED_UPLOAD",
            false,
            Some("Check request format and encoding"),
            false,
            LogLevel::Warn,
        ),
        IngestError::RemoteFetchFailed { .. } => (
            406,
            "REMOTE_FETCH_FAILED",
            false,
            Some("Verify the URL and try again"),
            false,
            LogLevel::Error,
        ),
        IngestError::UnsupportedMediaType(_) => (
            415,
            "UNSUPPORTED_MEDIA_TYPE",
            false,
            Some("Send multipart/form-data or an accepted JSON payload"),
            false,
            LogLevel::Warn,
        ),
        IngestError::StoreWriteFailed(_) => (
            500,
            "STORE_WRITE_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl IngestError {
    /// Build a policy-level file count rejection.
    pub fn too_many_files(message: impl Into<String>) -> Self {
        IngestError::TooManyFiles {
            message: message.into(),
            origin: LimitOrigin::Policy,
        }
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            IngestError::UnexpectedField(_) => "UnexpectedField",
            IngestError::UnsupportedMimetype(_) => "UnsupportedMimetype",
            IngestError::TooManyFiles { .. } => "TooManyFiles",
            IngestError::FileTooLarge(_) => "FileTooLarge",
            IngestError::TooManyParts(_) => "TooManyParts",
            IngestError::TooManyFields(_) => "TooManyFields",
            IngestError::MalformedUpload(_) => "MalformedUpload",
            IngestError::RemoteFetchFailed { .. } => "RemoteFetchFailed",
            IngestError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            IngestError::StoreWriteFailed(_) => "StoreWriteFailed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IngestError::UnexpectedField(_)
            | IngestError::UnsupportedMimetype(_)
            | IngestError::TooManyFiles {
                origin: LimitOrigin::Policy,
                ..
            } => ErrorCategory::PolicyRejection,
            IngestError::TooManyFiles {
                origin: LimitOrigin::Parser,
                ..
            }
            | IngestError::FileTooLarge(_)
            | IngestError::TooManyParts(_)
            | IngestError::TooManyFields(_) => ErrorCategory::ResourceLimitExceeded,
            IngestError::RemoteFetchFailed { .. } | IngestError::StoreWriteFailed(_) => {
                ErrorCategory::UpstreamFailure
            }
            IngestError::MalformedUpload(_) | IngestError::UnsupportedMediaType(_) => {
                ErrorCategory::ProtocolFailure
            }
        }
    }

    /// Get detailed error information, including upstream diagnostics
    pub fn detailed_message(&self) -> String {
        match self {
            IngestError::RemoteFetchFailed {
                url, status, body, ..
            } => {
                let mut details = format!("{}\n  url: {}", self, url);
                if let Some(status) = status {
                    details.push_str(&format!("\n  upstream status: {}", status));
                }
                if let Some(body) = body {
                    details.push_str(&format!("\n  upstream body: {}", body));
                }
                details
            }
            _ => self.to_string(),
        }
    }
}

impl ErrorMetadata for IngestError {
    fn http_status_code(&self) -> u16 {
        ingest_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        ingest_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        ingest_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        ingest_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        ingest_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        ingest_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            IngestError::UnexpectedField(ref msg) => msg.clone(),
            IngestError::UnsupportedMimetype(ref msg) => msg.clone(),
            IngestError::TooManyFiles { ref message, .. } => message.clone(),
            IngestError::FileTooLarge(ref msg) => msg.clone(),
            IngestError::TooManyParts(ref msg) => msg.clone(),
            IngestError::TooManyFields(ref msg) => msg.clone(),
            IngestError::MalformedUpload(ref msg) => msg.clone(),
            IngestError::RemoteFetchFailed { ref message, .. } => message.clone(),
            IngestError::UnsupportedMediaType(ref msg) => msg.clone(),
            IngestError::StoreWriteFailed(_) => "Failed to store uploaded file".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_policy_rejection() {
        let err = IngestError::UnexpectedField("The field avatar is not expected".to_string());
        assert_eq!(err.http_status_code(), 422);
        assert_eq!(err.error_code(), "UNEXPECTED_FIELD");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "The field avatar is not expected");
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert_eq!(err.category(), ErrorCategory::PolicyRejection);
    }

    #[test]
    fn test_too_many_files_status_depends_on_origin() {
        let policy = IngestError::too_many_files("The field doc accepts a maximum of 1 files");
        assert_eq!(policy.http_status_code(), 422);
        assert_eq!(policy.category(), ErrorCategory::PolicyRejection);

        let parser = IngestError::TooManyFiles {
            message: "Too many files".to_string(),
            origin: LimitOrigin::Parser,
        };
        assert_eq!(parser.http_status_code(), 413);
        assert_eq!(parser.error_code(), "LIMIT_FILE_COUNT");
        assert_eq!(parser.category(), ErrorCategory::ResourceLimitExceeded);
    }

    #[test]
    fn test_error_metadata_store_write_failed_is_sensitive() {
        let err = IngestError::StoreWriteFailed("connection reset by peer".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Failed to store uploaded file");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_remote_fetch_details_keep_upstream_context() {
        let err = IngestError::RemoteFetchFailed {
            url: "https://cdn.example.com/a.png".to_string(),
            status: Some(404),
            body: Some("not here".to_string()),
            message: "Cannot download file".to_string(),
        };
        assert_eq!(err.http_status_code(), 406);
        let details = err.detailed_message();
        assert!(details.contains("https://cdn.example.com/a.png"));
        assert!(details.contains("404"));
        assert!(details.contains("not here"));
    }

    #[test]
    fn test_media_type_and_limits_status_codes() {
        assert_eq!(
            IngestError::UnsupportedMediaType("Missing Content-Type".into()).http_status_code(),
            415
        );
        assert_eq!(
            IngestError::FileTooLarge("file too large".into()).http_status_code(),
            413
        );
        assert_eq!(
            IngestError::TooManyParts("Too many parts".into()).http_status_code(),
            413
        );
        assert_eq!(
            IngestError::MalformedUpload("bad boundary".into()).http_status_code(),
            400
        );
    }
}
