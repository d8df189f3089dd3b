//! Streaming ingestion state machine.
//!
//! The machine performs no I/O. Parser events and write completions go in,
//! store commands come out, and exactly one [`Command::Settle`] is emitted
//! per request. The caller owns the machine, so every state mutation is
//! serialized by construction.
//!
//! ```text
//!   Open ──(parse finished | error latched)──▶ Settling ──(no pending writes)──▶ Done
//!     └──────────────(same, nothing pending)────────────────────────────────────▲
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use barkeeper_core::{
    AcceptedFile, BlobEncoding, IdentityMode, IngestError, IngestionOutcome, LimitOrigin,
};
use barkeeper_processing::{
    decode_base64_forgiving, encode_for_store, identify, random_token, ChunkEncoder, ContentSniffer,
    FieldPolicyValidator, DEFAULT_MIMETYPE,
};
use bytes::{Bytes, BytesMut};

use super::IngestSettings;

/// Identifier the parser assigns to each part of a multipart body.
pub type PartId = u64;

const FIELD_ENCODING: &str = "base64";
const DEFAULT_TRANSFER_ENCODING: &str = "7bit";
/// Leading bytes kept for content sniffing on the append path.
const SNIFF_HEAD_BYTES: usize = 8192;

/// Correlates a store command with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteTicket(u64);

/// Events produced by the multipart tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartEvent {
    /// A complete non-file field.
    Field { name: String, value: String },
    FilePartStart {
        part: PartId,
        name: String,
        filename: Option<String>,
        encoding: Option<String>,
        mime: Option<String>,
    },
    FilePartChunk { part: PartId, bytes: Bytes },
    FilePartEnd { part: PartId },
    /// The part (or the whole body) grew past its size cap.
    FilePartLimitExceeded { part: PartId },
    ParseError { message: String },
    FilesLimit,
    PartsLimit,
    FieldsLimit,
    ParseFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Part(PartEvent),
    WriteCompleted {
        ticket: WriteTicket,
        result: Result<(), String>,
    },
}

impl From<PartEvent> for IngestEvent {
    fn from(event: PartEvent) -> Self {
        IngestEvent::Part(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value EX ttl`
    Put {
        ticket: WriteTicket,
        key: String,
        value: Bytes,
        ttl: Duration,
    },
    /// `APPEND key chunk`
    Append {
        ticket: WriteTicket,
        key: String,
        chunk: Bytes,
    },
    Settle(IngestionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Settling,
    Done,
}

#[derive(Debug)]
enum PendingWrite {
    /// Whole-file write; the file is admitted once it completes.
    Candidate(AcceptedFile),
    /// One chunk of a file written incrementally.
    Chunk { part: PartId },
}

#[derive(Debug)]
struct FileMeta {
    field_name: String,
    filename: String,
    encoding: String,
    mime: String,
}

#[derive(Debug)]
enum PartState {
    Discard,
    Buffering { meta: FileMeta, buf: BytesMut },
    Appending(AppendState),
}

enum AppendStep {
    Write { key: String, chunk: Bytes, first: bool },
    Complete,
    Idle,
}

#[derive(Debug)]
struct AppendState {
    meta: FileMeta,
    key: String,
    encoder: Option<ChunkEncoder>,
    queue: VecDeque<Bytes>,
    head: Vec<u8>,
    size: u64,
    started: bool,
    in_flight: bool,
    ended: bool,
}

impl AppendState {
    fn new(meta: FileMeta, encoding: BlobEncoding) -> Self {
        Self {
            meta,
            key: random_token(),
            encoder: Some(ChunkEncoder::new(encoding)),
            queue: VecDeque::new(),
            head: Vec::new(),
            size: 0,
            started: false,
            in_flight: false,
            ended: false,
        }
    }

    fn accept_chunk(&mut self, bytes: &[u8]) {
        self.size += bytes.len() as u64;
        if self.head.len() < SNIFF_HEAD_BYTES {
            let take = (SNIFF_HEAD_BYTES - self.head.len()).min(bytes.len());
            self.head.extend_from_slice(&bytes[..take]);
        }
        if let Some(encoder) = self.encoder.as_mut() {
            let encoded = encoder.push(bytes);
            if !encoded.is_empty() {
                self.queue.push_back(encoded);
            }
        }
    }

    fn end(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder.finish();
            if !tail.is_empty() {
                self.queue.push_back(tail);
            }
        }
        // An empty file still needs its key created with a TTL.
        if !self.started && self.queue.is_empty() {
            self.queue.push_back(Bytes::new());
        }
        self.ended = true;
    }

    fn next_step(&mut self) -> AppendStep {
        if self.in_flight {
            return AppendStep::Idle;
        }
        if let Some(chunk) = self.queue.pop_front() {
            let first = !self.started;
            self.started = true;
            self.in_flight = true;
            return AppendStep::Write {
                key: self.key.clone(),
                chunk,
                first,
            };
        }
        if self.ended {
            AppendStep::Complete
        } else {
            AppendStep::Idle
        }
    }

    fn into_accepted(self, sniffer: &dyn ContentSniffer) -> AcceptedFile {
        AcceptedFile {
            extension: sniffer.sniff(&self.head).map(|s| s.extension),
            key: self.key,
            field_name: self.meta.field_name,
            original_name: self.meta.filename,
            encoding: self.meta.encoding,
            mime_type: self.meta.mime,
            size_bytes: self.size,
        }
    }
}

/// Per-request ingestion state machine for multipart bodies.
pub struct IngestionMachine {
    validator: FieldPolicyValidator,
    sniffer: Arc<dyn ContentSniffer>,
    identity_mode: IdentityMode,
    blob_encoding: BlobEncoding,
    blob_ttl: Duration,
    appends_chunks: bool,
    phase: Phase,
    finished: bool,
    terminal: Option<IngestError>,
    accepted: Vec<AcceptedFile>,
    pending: HashMap<WriteTicket, PendingWrite>,
    parts: HashMap<PartId, PartState>,
    next_ticket: u64,
}

impl IngestionMachine {
    pub fn new(
        validator: FieldPolicyValidator,
        sniffer: Arc<dyn ContentSniffer>,
        settings: &IngestSettings,
    ) -> Self {
        Self {
            validator,
            sniffer,
            identity_mode: settings.identity_mode,
            blob_encoding: settings.blob_encoding,
            blob_ttl: settings.blob_ttl,
            appends_chunks: settings.appends_chunks(),
            phase: Phase::Open,
            finished: false,
            terminal: None,
            accepted: Vec::new(),
            pending: HashMap::new(),
            parts: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// True while the machine still depends on parser events to make
    /// progress.
    pub fn awaiting_parser(&self) -> bool {
        self.phase != Phase::Done && !self.finished && self.terminal.is_none()
    }

    /// Apply one event and return the commands it produced.
    ///
    /// Once the machine is `Done` every event is a no-op.
    pub fn handle(&mut self, event: IngestEvent) -> Vec<Command> {
        if self.phase == Phase::Done {
            return Vec::new();
        }

        let mut commands = Vec::new();
        match event {
            IngestEvent::Part(event) => self.on_part(event, &mut commands),
            IngestEvent::WriteCompleted { ticket, result } => {
                self.on_write_completed(ticket, result, &mut commands)
            }
        }
        self.try_settle(&mut commands);
        commands
    }

    fn on_part(&mut self, event: PartEvent, out: &mut Vec<Command>) {
        match event {
            PartEvent::Field { name, value } => self.on_field(name, value, out),
            PartEvent::FilePartStart {
                part,
                name,
                filename,
                encoding,
                mime,
            } => self.on_file_start(part, name, filename, encoding, mime),
            PartEvent::FilePartChunk { part, bytes } => self.on_file_chunk(part, &bytes, out),
            PartEvent::FilePartEnd { part } => self.on_file_end(part, out),
            PartEvent::FilePartLimitExceeded { part } => {
                self.parts.remove(&part);
                self.latch(IngestError::FileTooLarge("file too large".to_string()));
            }
            PartEvent::ParseError { message } => self.latch(IngestError::MalformedUpload(message)),
            PartEvent::FilesLimit => self.latch(IngestError::TooManyFiles {
                message: "Too many files".to_string(),
                origin: LimitOrigin::Parser,
            }),
            PartEvent::PartsLimit => {
                self.latch(IngestError::TooManyParts("Too many parts".to_string()))
            }
            PartEvent::FieldsLimit => {
                self.latch(IngestError::TooManyFields("Too many fields".to_string()))
            }
            PartEvent::ParseFinished => self.finished = true,
        }
    }

    fn on_field(&mut self, name: String, value: String, out: &mut Vec<Command>) {
        if name.is_empty() || value.is_empty() || self.terminal.is_some() {
            return;
        }

        if let Err(err) = self.admit(&name, None) {
            return self.latch(err);
        }

        let bytes = decode_base64_forgiving(&value);
        if bytes.is_empty() {
            tracing::debug!(field = %name, "Field carries no base64 content, ignoring");
            return;
        }

        let sniffed = self.sniffer.sniff(&bytes);
        let mime = sniffed
            .as_ref()
            .map(|s| s.mime.clone())
            .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());

        if let Err(err) = self.admit(&name, Some(&mime)) {
            return self.latch(err);
        }

        let key = identify(self.identity_mode, &bytes);
        let file = AcceptedFile {
            key: key.clone(),
            field_name: name.clone(),
            original_name: name,
            encoding: FIELD_ENCODING.to_string(),
            mime_type: mime,
            extension: sniffed.map(|s| s.extension),
            size_bytes: bytes.len() as u64,
        };
        let value = encode_for_store(self.blob_encoding, &bytes);
        self.issue_put(key, value, PendingWrite::Candidate(file), out);
    }

    fn on_file_start(
        &mut self,
        part: PartId,
        name: String,
        filename: Option<String>,
        encoding: Option<String>,
        mime: Option<String>,
    ) {
        if self.terminal.is_some() {
            self.parts.insert(part, PartState::Discard);
            return;
        }

        let Some(filename) = filename.filter(|f| !f.is_empty()) else {
            self.parts.insert(part, PartState::Discard);
            return;
        };

        let mime = mime.unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
        if let Err(err) = self.admit(&name, Some(&mime)) {
            self.parts.insert(part, PartState::Discard);
            return self.latch(err);
        }

        let meta = FileMeta {
            field_name: name,
            filename,
            encoding: encoding.unwrap_or_else(|| DEFAULT_TRANSFER_ENCODING.to_string()),
            mime,
        };
        let state = if self.appends_chunks {
            PartState::Appending(AppendState::new(meta, self.blob_encoding))
        } else {
            PartState::Buffering {
                meta,
                buf: BytesMut::new(),
            }
        };
        self.parts.insert(part, state);
    }

    fn on_file_chunk(&mut self, part: PartId, bytes: &[u8], out: &mut Vec<Command>) {
        match self.parts.get_mut(&part) {
            Some(PartState::Buffering { buf, .. }) => buf.extend_from_slice(bytes),
            Some(PartState::Appending(state)) => {
                state.accept_chunk(bytes);
                self.pump(part, out);
            }
            Some(PartState::Discard) | None => {}
        }
    }

    fn on_file_end(&mut self, part: PartId, out: &mut Vec<Command>) {
        match self.parts.remove(&part) {
            Some(PartState::Buffering { meta, buf }) => {
                let bytes = buf.freeze();
                let key = identify(self.identity_mode, &bytes);
                let file = AcceptedFile {
                    key: key.clone(),
                    field_name: meta.field_name,
                    original_name: meta.filename,
                    encoding: meta.encoding,
                    mime_type: meta.mime,
                    extension: self.sniffer.sniff(&bytes).map(|s| s.extension),
                    size_bytes: bytes.len() as u64,
                };
                let value = encode_for_store(self.blob_encoding, &bytes);
                self.issue_put(key, value, PendingWrite::Candidate(file), out);
            }
            Some(PartState::Appending(mut state)) => {
                state.end();
                self.parts.insert(part, PartState::Appending(state));
                self.pump(part, out);
            }
            Some(PartState::Discard) | None => {}
        }
    }

    fn on_write_completed(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), String>,
        out: &mut Vec<Command>,
    ) {
        let Some(write) = self.pending.remove(&ticket) else {
            tracing::warn!(ticket = ?ticket, "Completion for unknown write ticket");
            return;
        };

        if let Err(message) = result {
            return self.latch(IngestError::StoreWriteFailed(message));
        }

        match write {
            PendingWrite::Candidate(file) => self.admit_file(file),
            PendingWrite::Chunk { part } => {
                if let Some(PartState::Appending(state)) = self.parts.get_mut(&part) {
                    state.in_flight = false;
                }
                self.pump(part, out);
            }
        }
    }

    /// Issue the next queued write of an appending part, or admit the file
    /// once its last write has landed. Appends of one part never overlap.
    fn pump(&mut self, part: PartId, out: &mut Vec<Command>) {
        if self.terminal.is_some() {
            return;
        }

        let step = match self.parts.get_mut(&part) {
            Some(PartState::Appending(state)) => state.next_step(),
            _ => return,
        };

        match step {
            AppendStep::Write { key, chunk, first } => {
                let ticket = self.allocate_ticket();
                self.pending.insert(ticket, PendingWrite::Chunk { part });
                let command = if first {
                    Command::Put {
                        ticket,
                        key,
                        value: chunk,
                        ttl: self.blob_ttl,
                    }
                } else {
                    Command::Append { ticket, key, chunk }
                };
                out.push(command);
            }
            AppendStep::Complete => {
                if let Some(PartState::Appending(state)) = self.parts.remove(&part) {
                    let file = state.into_accepted(self.sniffer.as_ref());
                    self.admit_file(file);
                }
            }
            AppendStep::Idle => {}
        }
    }

    fn admit(&self, field: &str, mime: Option<&str>) -> Result<(), IngestError> {
        self.validator.check_field_allowed(field)?;
        if let Some(mime) = mime {
            self.validator.check_mimetype(field, mime)?;
        }
        Ok(())
    }

    fn admit_file(&mut self, file: AcceptedFile) {
        if self.terminal.is_some() {
            return;
        }

        let verdict = self
            .validator
            .check_file_count(&self.accepted, &file.field_name);
        match verdict {
            Ok(()) => {
                tracing::debug!(
                    field = %file.field_name,
                    key = %file.key,
                    size_bytes = file.size_bytes,
                    "File accepted"
                );
                self.accepted.push(file);
            }
            Err(rejection) => self.latch(rejection.into()),
        }
    }

    fn issue_put(
        &mut self,
        key: String,
        value: Bytes,
        write: PendingWrite,
        out: &mut Vec<Command>,
    ) {
        let ticket = self.allocate_ticket();
        self.pending.insert(ticket, write);
        out.push(Command::Put {
            ticket,
            key,
            value,
            ttl: self.blob_ttl,
        });
    }

    fn allocate_ticket(&mut self) -> WriteTicket {
        let ticket = WriteTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Record a terminal error. Only the first one is kept.
    fn latch(&mut self, err: IngestError) {
        if let Some(first) = &self.terminal {
            tracing::debug!(error = %err, first = %first, "Ignoring error after terminal error");
            return;
        }

        tracing::debug!(
            error = %err,
            pending = self.pending.len(),
            "Ingestion error latched"
        );
        for state in self.parts.values_mut() {
            *state = PartState::Discard;
        }
        self.terminal = Some(err);
    }

    fn try_settle(&mut self, out: &mut Vec<Command>) {
        if self.phase == Phase::Done || !(self.finished || self.terminal.is_some()) {
            return;
        }

        if !self.pending.is_empty() {
            self.phase = Phase::Settling;
            return;
        }

        self.phase = Phase::Done;
        let outcome = match self.terminal.take() {
            Some(err) => IngestionOutcome::Failure(err),
            None => IngestionOutcome::Success(std::mem::take(&mut self.accepted)),
        };
        out.push(Command::Settle(outcome));
    }
}
