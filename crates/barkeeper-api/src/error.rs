//! HTTP error response conversion
//!
//! Ingestion failures are `IngestError`s from barkeeper-core. `HttpAppError`
//! wraps them so they can be rendered as a JSON `ErrorResponse` with the
//! status code their `ErrorMetadata` declares.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use barkeeper_core::{ErrorMetadata, IngestError, LogLevel};
use barkeeper_storage::StorageError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for IngestError to implement IntoResponse
/// (orphan rules: IngestError lives in barkeeper-core)
#[derive(Debug)]
pub struct HttpAppError(pub IngestError);

impl From<IngestError> for HttpAppError {
    fn from(err: IngestError) -> Self {
        HttpAppError(err)
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(IngestError::StoreWriteFailed(err.to_string()))
    }
}

fn log_error(error: &IngestError) {
    let error_type = error.error_type();
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type, code, "Upload rejected");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type, code, "Upload rejected");
        }
        LogLevel::Error => {
            tracing::error!(
                error = %error,
                details = %error.detailed_message(),
                error_type,
                code,
                "Upload failed"
            );
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl HttpAppError {
    fn error_response(&self, hide_details: bool) -> ErrorResponse {
        let err = &self.0;
        let (details, error_type) = if hide_details || err.is_sensitive() {
            (None, None)
        } else {
            (
                Some(err.detailed_message()),
                Some(err.error_type().to_string()),
            )
        };

        ErrorResponse {
            error: err.client_message(),
            details,
            error_type,
            code: err.error_code().to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action().map(String::from),
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(&self.0);

        let body = self.error_response(is_production_env());
        (status, Json(body)).into_response()
    }
}
