use barkeeper_core::{IngestError, ResolvedPolicy};

/// How a request body is ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestMode {
    Streaming { boundary: String },
    Json,
}

/// Pick the ingestion mode from the `Content-Type` header.
///
/// JSON bodies are only accepted when the policy lists `application/json`;
/// anything else must be multipart with a parseable boundary.
pub fn route(content_type: Option<&str>, policy: &ResolvedPolicy) -> Result<IngestMode, IngestError> {
    let Some(content_type) = content_type else {
        return Err(IngestError::UnsupportedMediaType(
            "Missing Content-Type header".to_string(),
        ));
    };

    if policy.json_enabled() && is_json(content_type) {
        return Ok(IngestMode::Json);
    }

    multer::parse_boundary(content_type)
        .map(|boundary| IngestMode::Streaming { boundary })
        .map_err(|e| {
            tracing::debug!(content_type, error = %e, "Unsupported request content type");
            IngestError::UnsupportedMediaType(format!(
                "Unsupported content type {}: {}",
                content_type, e
            ))
        })
}

fn is_json(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|m| {
            m.type_() == mime::APPLICATION
                && (m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
        })
        .unwrap_or(false)
}
