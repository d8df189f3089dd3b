//! Multipart reader task.
//!
//! Tokenizes the request body with `multer` and forwards [`PartEvent`]s over
//! a bounded channel. A full channel suspends reading, which keeps at most a
//! few chunks of the body in memory. When the receiver goes away, or after
//! a terminal event, the rest of the body is drained and the parser dropped.

use barkeeper_core::ParserLimits;
use bytes::BytesMut;
use multer::{Constraints, Field, Multipart, SizeLimit};
use tokio::sync::mpsc;

use super::machine::{PartEvent, PartId};

const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";

/// Why forwarding stopped before the end of the body.
enum Stop {
    /// The coordinator settled and dropped its receiver.
    ReceiverGone,
    /// A terminal event was forwarded.
    Aborted,
}

#[derive(Default)]
struct PartCounts {
    parts: usize,
    files: usize,
    fields: usize,
}

impl PartCounts {
    /// Count one more part, returning the cap event if it crosses one.
    fn admit(&mut self, is_file: bool, limits: &ParserLimits) -> Option<PartEvent> {
        self.parts += 1;
        if limits.max_parts.is_some_and(|max| self.parts > max) {
            return Some(PartEvent::PartsLimit);
        }

        if is_file {
            self.files += 1;
            if limits.max_files.is_some_and(|max| self.files > max) {
                return Some(PartEvent::FilesLimit);
            }
        } else {
            self.fields += 1;
            if limits.max_fields.is_some_and(|max| self.fields > max) {
                return Some(PartEvent::FieldsLimit);
            }
        }

        None
    }
}

/// Size constraints matching the configured parser limits.
pub fn constraints(limits: &ParserLimits) -> Constraints {
    Constraints::new().size_limit(
        SizeLimit::new()
            .whole_stream(limits.max_body_size_bytes)
            .per_field(limits.max_file_size_bytes),
    )
}

/// Read every part of `multipart`, forwarding events to `events`.
pub async fn read_parts(
    mut multipart: Multipart<'static>,
    limits: ParserLimits,
    events: mpsc::Sender<PartEvent>,
) {
    match forward_parts(&mut multipart, &limits, &events).await {
        Ok(()) => tracing::debug!("Multipart body fully parsed"),
        Err(Stop::ReceiverGone) => {
            tracing::debug!("Ingestion settled before the end of the body, draining");
            drain(&mut multipart).await;
        }
        Err(Stop::Aborted) => drain(&mut multipart).await,
    }
}

async fn forward_parts(
    multipart: &mut Multipart<'static>,
    limits: &ParserLimits,
    events: &mpsc::Sender<PartEvent>,
) -> Result<(), Stop> {
    let mut counts = PartCounts::default();
    let mut next_part: PartId = 0;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                send(events, error_event(err, next_part)).await?;
                return Err(Stop::Aborted);
            }
        };

        let part = next_part;
        next_part += 1;

        let is_file = field.file_name().is_some();
        if let Some(limit) = counts.admit(is_file, limits) {
            tracing::warn!(part, event = ?limit, "Multipart parser cap reached");
            send(events, limit).await?;
            return Err(Stop::Aborted);
        }

        if is_file {
            forward_file(field, part, events).await?;
        } else {
            forward_field(field, part, events).await?;
        }
    }

    send(events, PartEvent::ParseFinished).await
}

async fn forward_file(
    mut field: Field<'static>,
    part: PartId,
    events: &mpsc::Sender<PartEvent>,
) -> Result<(), Stop> {
    let start = PartEvent::FilePartStart {
        part,
        name: field.name().unwrap_or_default().to_string(),
        filename: field.file_name().map(str::to_string),
        encoding: field
            .headers()
            .get(CONTENT_TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        mime: field.content_type().map(|m| m.to_string()),
    };
    send(events, start).await?;

    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => send(events, PartEvent::FilePartChunk { part, bytes }).await?,
            Ok(None) => break,
            Err(err) => {
                send(events, error_event(err, part)).await?;
                return Err(Stop::Aborted);
            }
        }
    }

    send(events, PartEvent::FilePartEnd { part }).await
}

async fn forward_field(
    mut field: Field<'static>,
    part: PartId,
    events: &mpsc::Sender<PartEvent>,
) -> Result<(), Stop> {
    let name = field.name().unwrap_or_default().to_string();
    let mut value = BytesMut::new();

    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => value.extend_from_slice(&bytes),
            Ok(None) => break,
            Err(err) => {
                send(events, error_event(err, part)).await?;
                return Err(Stop::Aborted);
            }
        }
    }

    let value = String::from_utf8_lossy(&value).into_owned();
    send(events, PartEvent::Field { name, value }).await
}

fn error_event(err: multer::Error, part: PartId) -> PartEvent {
    match err {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            PartEvent::FilePartLimitExceeded { part }
        }
        other => PartEvent::ParseError {
            message: other.to_string(),
        },
    }
}

async fn send(events: &mpsc::Sender<PartEvent>, event: PartEvent) -> Result<(), Stop> {
    events.send(event).await.map_err(|_| Stop::ReceiverGone)
}

/// Consume whatever the parser can still read; stops at the first error.
async fn drain(multipart: &mut Multipart<'static>) {
    let mut skipped = 0usize;
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(chunk)) = field.chunk().await {
            skipped += chunk.len();
        }
    }
    tracing::debug!(skipped_bytes = skipped, "Multipart body drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BOUNDARY: &str = "X-BOUNDARY";

    fn body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                    name, filename
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    async fn collect(raw: String, limits: ParserLimits) -> Vec<PartEvent> {
        let chunks: Vec<Result<Bytes, std::io::Error>> = raw
            .into_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let multipart =
            Multipart::with_constraints(stream::iter(chunks), BOUNDARY, constraints(&limits));
        let (tx, mut rx) = mpsc::channel(2);
        let reader = tokio::spawn(read_parts(multipart, limits, tx));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        reader.await.unwrap();
        events
    }

    fn file_bytes(events: &[PartEvent], wanted: PartId) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                PartEvent::FilePartChunk { part, bytes } if *part == wanted => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test]
    async fn test_forwards_fields_and_files_in_order() {
        let raw = body(&[
            ("note", None, "aGVsbG8="),
            ("doc", Some("a.txt"), "file contents"),
        ]);
        let events = collect(raw, ParserLimits::default()).await;

        assert_eq!(
            events[0],
            PartEvent::Field {
                name: "note".to_string(),
                value: "aGVsbG8=".to_string()
            }
        );
        match &events[1] {
            PartEvent::FilePartStart {
                part,
                name,
                filename,
                mime,
                ..
            } => {
                assert_eq!(*part, 1);
                assert_eq!(name, "doc");
                assert_eq!(filename.as_deref(), Some("a.txt"));
                assert_eq!(mime.as_deref(), Some("text/plain"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(file_bytes(&events, 1), b"file contents");
        assert_eq!(
            &events[events.len() - 2..],
            &[PartEvent::FilePartEnd { part: 1 }, PartEvent::ParseFinished]
        );
    }

    #[tokio::test]
    async fn test_file_size_cap_reports_limit_event() {
        let raw = body(&[("doc", Some("big.txt"), "0123456789abcdef")]);
        let limits = ParserLimits {
            max_file_size_bytes: 8,
            ..ParserLimits::default()
        };
        let events = collect(raw, limits).await;
        assert!(events.contains(&PartEvent::FilePartLimitExceeded { part: 0 }));
        assert!(!events.contains(&PartEvent::ParseFinished));
    }

    #[tokio::test]
    async fn test_oversized_part_drains_the_rest_of_the_body() {
        let big = "0123456789abcdef".repeat(256);
        let raw = body(&[
            ("doc", Some("big.txt"), big.as_str()),
            ("next", Some("next.txt"), "still read off the wire"),
        ]);
        let tail = format!("\r\n--{}--\r\n", BOUNDARY);
        let head = raw.strip_suffix(tail.as_str()).unwrap().as_bytes().to_vec();

        let mut chunks: Vec<Bytes> = head.chunks(128).map(Bytes::copy_from_slice).collect();
        chunks.push(Bytes::from(tail));
        let total = chunks.len();

        let consumed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&consumed);
        let input = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>)).inspect(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let limits = ParserLimits {
            max_file_size_bytes: 1024,
            ..ParserLimits::default()
        };
        let multipart = Multipart::with_constraints(input, BOUNDARY, constraints(&limits));
        let (tx, mut rx) = mpsc::channel(2);
        let reader = tokio::spawn(read_parts(multipart, limits, tx));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        reader.await.unwrap();

        assert_eq!(events.last(), Some(&PartEvent::FilePartLimitExceeded { part: 0 }));
        assert_eq!(consumed.load(Ordering::SeqCst), total);
    }

    #[tokio::test]
    async fn test_part_caps_stop_forwarding() {
        let raw = body(&[
            ("a", Some("a.txt"), "a"),
            ("b", Some("b.txt"), "b"),
            ("c", None, "c"),
        ]);
        let limits = ParserLimits {
            max_files: Some(1),
            ..ParserLimits::default()
        };
        let events = collect(raw.clone(), limits).await;
        assert_eq!(events.last(), Some(&PartEvent::FilesLimit));

        let limits = ParserLimits {
            max_parts: Some(2),
            ..ParserLimits::default()
        };
        let events = collect(raw, limits).await;
        assert_eq!(events.last(), Some(&PartEvent::PartsLimit));
    }

    #[tokio::test]
    async fn test_truncated_body_is_a_parse_error() {
        let raw = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\r\nunterminated",
            BOUNDARY
        );
        let events = collect(raw, ParserLimits::default()).await;
        assert!(matches!(events.last(), Some(PartEvent::ParseError { .. })));
    }

    #[tokio::test]
    async fn test_reader_stops_when_receiver_is_dropped() {
        let raw = body(&[("a", Some("a.txt"), "aaaa"), ("b", Some("b.txt"), "bbbb")]);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Ok(Bytes::from(raw))];
        let limits = ParserLimits::default();
        let multipart =
            Multipart::with_constraints(stream::iter(chunks), BOUNDARY, constraints(&limits));
        let (tx, mut rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_parts(multipart, limits, tx));

        assert!(rx.recv().await.is_some());
        drop(rx);
        reader.await.unwrap();
    }
}
