//! Upload ingestion middleware
//!
//! Ingests the request body before the handler runs. On success the
//! accepted files are attached to the request as [`UploadedFiles`]; on
//! failure the request is answered with the ingestion error and the handler
//! never runs.

use std::ops::Deref;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use barkeeper_core::{AcceptedFile, IngestionOutcome};

use crate::error::{ErrorResponse, HttpAppError};
use crate::services::ingest::{driver, json, route, IngestMode};
use crate::state::UploadState;

/// Files accepted for the current request.
///
/// Inserted once by [`upload_middleware`]; the list cannot be modified
/// afterwards.
#[derive(Debug, Clone)]
pub struct UploadedFiles(Arc<[AcceptedFile]>);

impl UploadedFiles {
    pub fn new(files: Vec<AcceptedFile>) -> Self {
        Self(files.into())
    }

    pub fn files(&self) -> &[AcceptedFile] {
        &self.0
    }
}

impl Deref for UploadedFiles {
    type Target = [AcceptedFile];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for UploadedFiles
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UploadedFiles>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Uploaded files are not available for this route".to_string(),
                        details: None,
                        error_type: None,
                        code: "MISSING_UPLOAD_MIDDLEWARE".to_string(),
                        recoverable: false,
                        suggested_action: None,
                    }),
                )
            })
    }
}

/// Ingest the request body according to the route's upload state.
pub async fn upload_middleware(
    State(upload): State<Arc<UploadState>>,
    request: Request,
    next: Next,
) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let mode = match route(content_type, &upload.policy) {
        Ok(mode) => mode,
        Err(e) => return HttpAppError(e).into_response(),
    };

    let (mut parts, body) = request.into_parts();

    let (outcome, body) = match mode {
        IngestMode::Streaming { boundary } => {
            let outcome = driver::run_streaming(&upload, body, boundary).await;
            parts.headers.remove(header::CONTENT_LENGTH);
            (outcome, Body::empty())
        }
        IngestMode::Json => {
            let limit = upload.settings.parser_limits.max_body_size_bytes;
            let raw = match json::read_body(body, limit).await {
                Ok(raw) => raw,
                Err(e) => return HttpAppError(e).into_response(),
            };
            // Handlers downstream may still want the JSON payload.
            (json::ingest_json(&upload, &raw).await, Body::from(raw))
        }
    };

    match outcome {
        IngestionOutcome::Success(files) => {
            tracing::debug!(count = files.len(), "Upload accepted");
            if parts
                .extensions
                .insert(UploadedFiles::new(files))
                .is_some()
            {
                tracing::warn!("Upload middleware applied more than once to the same request");
            }
            next.run(Request::from_parts(parts, body)).await
        }
        IngestionOutcome::Failure(e) => HttpAppError(e).into_response(),
    }
}
