//! JSON-mode ingestion.
//!
//! The payload names its files under one selector, either base64 content or
//! URLs to download. Every entry is processed concurrently and runs to
//! completion; the request fails as a whole if any entry failed.

use axum::body::Body;
use barkeeper_core::{AcceptedFile, IngestError, IngestionOutcome, ResolvedPolicy};
use barkeeper_processing::{
    decode_base64_entry, encode_for_store, identify, SniffResult, DEFAULT_MIMETYPE,
};
use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{Map, Value};

use crate::state::UploadState;

const ENTRY_ENCODING: &str = "base64";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Base64,
    Url,
}

impl Source {
    /// Field name given to an entry sent as a bare string.
    fn default_field(self) -> &'static str {
        match self {
            Source::Base64 => "base64",
            Source::Url => "urls",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JsonEntry {
    field: String,
    content: String,
}

/// Buffer a request body, failing once it grows past `limit` bytes.
pub async fn read_body(body: Body, limit: u64) -> Result<Bytes, IngestError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            IngestError::MalformedUpload(format!("Failed to read request body: {}", e))
        })?;
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(IngestError::FileTooLarge("Request body too large".to_string()));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

/// Ingest a JSON payload.
pub async fn ingest_json(upload: &UploadState, raw: &[u8]) -> IngestionOutcome {
    let (source, entries) = match parse_payload(raw, &upload.policy) {
        Ok(parsed) => parsed,
        Err(e) => return IngestionOutcome::Failure(e),
    };

    tracing::debug!(count = entries.len(), source = ?source, "Ingesting JSON payload");

    // Entries that already started their store write are left to finish.
    let results = join_all(
        entries
            .into_iter()
            .map(|entry| ingest_entry(upload, source, entry)),
    )
    .await;

    results.into_iter().collect::<Result<Vec<_>, _>>().into()
}

fn parse_payload(
    raw: &[u8],
    policy: &ResolvedPolicy,
) -> Result<(Source, Vec<JsonEntry>), IngestError> {
    let payload: Value = serde_json::from_slice(raw)
        .map_err(|e| IngestError::MalformedUpload(format!("Invalid JSON payload: {}", e)))?;

    let base64_name = policy.body_base64_field_name();
    let url_name = policy.body_url_field_name();

    let (source, selected) = match payload.as_object() {
        Some(object) if is_present(object.get(base64_name)) => (Source::Base64, &object[base64_name]),
        Some(object) if is_present(object.get(url_name)) => (Source::Url, &object[url_name]),
        _ => {
            return Err(IngestError::MalformedUpload(format!(
                "Invalid payload. To json request use \"{}\" or \"{}\" fields",
                base64_name, url_name
            )))
        }
    };

    let entries = match selected {
        Value::String(content) => vec![JsonEntry {
            field: source.default_field().to_string(),
            content: content.clone(),
        }],
        Value::Object(map) => entries_from_map(map)?,
        _ => {
            return Err(IngestError::MalformedUpload(format!(
                "The {} entry must be a string or an object of strings",
                source.default_field()
            )))
        }
    };

    Ok((source, entries))
}

fn entries_from_map(map: &Map<String, Value>) -> Result<Vec<JsonEntry>, IngestError> {
    map.iter()
        .map(|(field, value)| match value {
            Value::String(content) => Ok(JsonEntry {
                field: field.clone(),
                content: content.clone(),
            }),
            _ => Err(IngestError::MalformedUpload(format!(
                "The field {} must hold a string",
                field
            ))),
        })
        .collect()
}

/// Loose truthiness: `null`, `false`, `""` and `0` count as absent.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    }
}

async fn ingest_entry(
    upload: &UploadState,
    source: Source,
    entry: JsonEntry,
) -> Result<AcceptedFile, IngestError> {
    let (bytes, declared) = match source {
        Source::Base64 => {
            let decoded = decode_base64_entry(&entry.content).map_err(|e| {
                IngestError::MalformedUpload(format!(
                    "The field {} is not valid base64: {}",
                    entry.field, e
                ))
            })?;
            (decoded.bytes, decoded.declared)
        }
        Source::Url => {
            let bytes = upload.fetcher.fetch(&entry.content).await.map_err(|e| {
                tracing::error!(
                    url = %entry.content,
                    status = ?e.status(),
                    body = ?e.body(),
                    error = %e,
                    "Cannot download remote file"
                );
                IngestError::RemoteFetchFailed {
                    url: entry.content.clone(),
                    status: e.status(),
                    body: e.body().map(str::to_string),
                    message: format!(
                        "Cannot download file from url {}. Verify the URL and try again.",
                        entry.content
                    ),
                }
            })?;
            (bytes.to_vec(), None)
        }
    };

    let detected: Option<SniffResult> = declared.or_else(|| upload.sniffer.sniff(&bytes));
    let key = identify(upload.settings.identity_mode, &bytes);
    let size_bytes = bytes.len() as u64;

    upload
        .store
        .put(
            &key,
            encode_for_store(upload.settings.blob_encoding, &bytes),
            upload.settings.blob_ttl,
        )
        .await
        .map_err(|e| {
            tracing::error!(%key, error = %e, "Failed to store JSON entry");
            IngestError::StoreWriteFailed(e.to_string())
        })?;

    tracing::debug!(field = %entry.field, %key, size_bytes, "JSON entry stored");

    let (mime_type, extension) = match detected {
        Some(SniffResult { mime, extension }) => {
            (mime, Some(extension).filter(|ext| !ext.is_empty()))
        }
        None => (DEFAULT_MIMETYPE.to_string(), None),
    };

    Ok(AcceptedFile {
        key,
        field_name: entry.field.clone(),
        original_name: entry.field,
        encoding: ENTRY_ENCODING.to_string(),
        mime_type,
        extension,
        size_bytes,
    })
}
