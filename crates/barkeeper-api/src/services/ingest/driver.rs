//! Executes the ingestion state machine for one multipart request.
//!
//! The coordinator owns the machine. It feeds it parser events from the
//! reader task and completions from the write tasks, and executes the
//! commands the machine emits until it settles.

use std::sync::Arc;

use axum::body::Body;
use barkeeper_core::{IngestError, IngestionOutcome};
use barkeeper_storage::BlobStore;
use multer::Multipart;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::machine::{Command, IngestEvent, IngestionMachine, PartEvent, WriteTicket};
use super::multipart_source::{constraints, read_parts};
use crate::state::UploadState;

/// Parser events buffered between the reader task and the coordinator.
const EVENT_CHANNEL_CAPACITY: usize = 32;

type WriteResult = (WriteTicket, Result<(), String>);

/// Ingest a multipart body and return its outcome.
///
/// The body is fully consumed (or abandoned at its size cap) before this
/// returns, whichever way ingestion ended.
pub async fn run_streaming(upload: &UploadState, body: Body, boundary: String) -> IngestionOutcome {
    let limits = upload.settings.parser_limits.clone();
    let multipart = Multipart::with_constraints(
        body.into_data_stream(),
        boundary,
        constraints(&limits),
    );

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let reader = tokio::spawn(read_parts(multipart, limits, tx));

    let machine = IngestionMachine::new(
        upload.validator(),
        Arc::clone(&upload.sniffer),
        &upload.settings,
    );
    let outcome = coordinate(machine, rx, Arc::clone(&upload.store)).await;

    if let Err(e) = reader.await {
        tracing::error!(error = %e, "Multipart reader task failed");
    }

    outcome
}

async fn coordinate(
    mut machine: IngestionMachine,
    mut events: mpsc::Receiver<PartEvent>,
    store: Arc<dyn BlobStore>,
) -> IngestionOutcome {
    let mut writes: JoinSet<WriteResult> = JoinSet::new();
    let mut parser_open = true;

    loop {
        let event: IngestEvent = tokio::select! {
            Some(joined) = writes.join_next(), if !writes.is_empty() => match joined {
                Ok((ticket, result)) => IngestEvent::WriteCompleted { ticket, result },
                Err(e) => {
                    tracing::error!(error = %e, "Blob write task aborted");
                    continue;
                }
            },
            received = events.recv(), if parser_open => match received {
                Some(event) => event.into(),
                None => {
                    parser_open = false;
                    if !machine.awaiting_parser() {
                        continue;
                    }
                    PartEvent::ParseError {
                        message: "Unexpected end of form".to_string(),
                    }
                    .into()
                }
            },
            else => {
                tracing::error!(
                    pending = machine.pending_writes(),
                    "Ingestion stalled without a settlement"
                );
                return IngestionOutcome::Failure(IngestError::StoreWriteFailed(
                    "Blob writes did not complete".to_string(),
                ));
            }
        };

        for command in machine.handle(event) {
            match command {
                Command::Settle(outcome) => return outcome,
                command => spawn_write(&mut writes, &store, command),
            }
        }
    }
}

fn spawn_write(writes: &mut JoinSet<WriteResult>, store: &Arc<dyn BlobStore>, command: Command) {
    let store = Arc::clone(store);
    match command {
        Command::Put {
            ticket,
            key,
            value,
            ttl,
        } => {
            writes.spawn(async move {
                let size = value.len();
                let result = store.put(&key, value, ttl).await.map_err(|e| e.to_string());
                if result.is_ok() {
                    tracing::debug!(%key, size_bytes = size, ticket = ?ticket, "Blob stored");
                }
                (ticket, result)
            });
        }
        Command::Append { ticket, key, chunk } => {
            writes.spawn(async move {
                let result = store.append(&key, chunk).await.map_err(|e| e.to_string());
                (ticket, result)
            });
        }
        Command::Settle(_) => {}
    }
}
