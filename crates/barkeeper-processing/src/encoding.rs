//! Base64 and data-URL decoding, and the encoding of values written to the
//! blob store.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use bytes::Bytes;

use barkeeper_core::BlobEncoding;

use crate::sniff::SniffResult;

/// Clients frequently strip padding, so decoding accepts both forms.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Accepts any trailing bits, for input that was never meant as base64.
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Extensions for the mimetypes a data-URL header commonly declares.
const DATA_URL_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("application/pdf", "pdf"),
];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Invalid data URL header: {0}")]
    InvalidDataUrl(String),
}

/// A decoded base64 entry, with the content type its data-URL header
/// declared, if it had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub bytes: Vec<u8>,
    pub declared: Option<SniffResult>,
}

/// Decode standard base64, ignoring ASCII whitespace and missing padding.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Decode whatever base64 can be recovered from `input`. Never fails.
///
/// Bytes outside the alphabet are skipped, URL-safe symbols are read as
/// their standard counterparts, and decoding stops at the first `=`. A
/// dangling final symbol carries fewer than 8 bits and is dropped.
pub fn decode_base64_forgiving(input: &str) -> Vec<u8> {
    let mut symbols: Vec<u8> = input
        .bytes()
        .take_while(|&b| b != b'=')
        .filter_map(|b| match b {
            b'-' => Some(b'+'),
            b'_' => Some(b'/'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' => Some(b),
            _ => None,
        })
        .collect();
    if symbols.len() % 4 == 1 {
        symbols.pop();
    }
    FORGIVING.decode(&symbols).unwrap_or_default()
}

/// Decode a base64 entry that may carry a `data:<mime>;base64,` header.
///
/// The header's mimetype is reported as declared; the extension is looked
/// up in a small table and left empty for anything else.
pub fn decode_base64_entry(input: &str) -> Result<DecodedEntry, DecodeError> {
    let Some((header, payload)) = input.rsplit_once(',') else {
        return Ok(DecodedEntry {
            bytes: decode_base64(input)?,
            declared: None,
        });
    };

    let mime = header
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| DecodeError::InvalidDataUrl(header.to_string()))?
        .trim_end_matches(";base64")
        .to_string();

    let extension = DATA_URL_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| (*ext).to_string())
        .unwrap_or_default();

    Ok(DecodedEntry {
        bytes: decode_base64(payload)?,
        declared: Some(SniffResult { mime, extension }),
    })
}

/// Render file bytes in the encoding stored in the cache.
pub fn encode_for_store(encoding: BlobEncoding, data: &[u8]) -> Bytes {
    match encoding {
        BlobEncoding::Base64 => Bytes::from(STANDARD.encode(data)),
        BlobEncoding::Raw => Bytes::copy_from_slice(data),
    }
}

/// Incremental encoder for values written chunk by chunk with `APPEND`.
///
/// Base64 output is only emitted for whole 3-byte groups, so the
/// concatenation of every pushed chunk plus `finish` equals the base64 of
/// the whole input.
#[derive(Debug)]
pub struct ChunkEncoder {
    encoding: BlobEncoding,
    carry: Vec<u8>,
}

impl ChunkEncoder {
    pub fn new(encoding: BlobEncoding) -> Self {
        Self {
            encoding,
            carry: Vec::with_capacity(2),
        }
    }

    /// Encode as much of `chunk` as can be emitted now. May return an
    /// empty buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        match self.encoding {
            BlobEncoding::Raw => Bytes::copy_from_slice(chunk),
            BlobEncoding::Base64 => {
                self.carry.extend_from_slice(chunk);
                let aligned = self.carry.len() - self.carry.len() % 3;
                let encoded = STANDARD.encode(&self.carry[..aligned]);
                self.carry.drain(..aligned);
                Bytes::from(encoded)
            }
        }
    }

    /// Flush whatever was held back, with padding.
    pub fn finish(self) -> Bytes {
        match self.encoding {
            BlobEncoding::Raw => Bytes::new(),
            BlobEncoding::Base64 => Bytes::from(STANDARD.encode(&self.carry)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_base64() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVs\nbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64("not*base64!").is_err());
    }

    #[test]
    fn test_forgiving_decode_matches_strict_decode_on_valid_input() {
        assert_eq!(decode_base64_forgiving("aGVsbG8="), b"hello");
        assert_eq!(decode_base64_forgiving("aGVs\nbG8"), b"hello");
        assert_eq!(decode_base64_forgiving("-_-_"), decode_base64("+/+/").unwrap());
    }

    #[test]
    fn test_forgiving_decode_never_fails_on_plain_text() {
        // "Nice photo!" keeps the symbols "Nicephoto"; the ninth is dropped.
        assert_eq!(
            decode_base64_forgiving("Nice photo!"),
            decode_base64("Nicephot").unwrap()
        );
        assert_eq!(decode_base64_forgiving("aGk=trailing"), b"hi");
        assert!(decode_base64_forgiving("***").is_empty());
    }

    #[test]
    fn test_data_url_header_supplies_mimetype() {
        let entry = decode_base64_entry("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(entry.bytes, b"hello");
        let declared = entry.declared.unwrap();
        assert_eq!(declared.mime, "image/jpeg");
        assert_eq!(declared.extension, "jpg");
    }

    #[test]
    fn test_data_url_unknown_mimetype_has_no_extension() {
        let entry = decode_base64_entry("data:text/plain;base64,aGVsbG8=").unwrap();
        let declared = entry.declared.unwrap();
        assert_eq!(declared.mime, "text/plain");
        assert_eq!(declared.extension, "");
    }

    #[test]
    fn test_entry_without_header_is_undeclared() {
        let entry = decode_base64_entry("aGVsbG8=").unwrap();
        assert!(entry.declared.is_none());
    }

    #[test]
    fn test_encode_for_store() {
        assert_eq!(
            encode_for_store(BlobEncoding::Base64, b"hello"),
            Bytes::from_static(b"aGVsbG8=")
        );
        assert_eq!(
            encode_for_store(BlobEncoding::Raw, b"hello"),
            Bytes::from_static(b"hello")
        );
    }

    #[test]
    fn test_chunk_encoder_matches_whole_encoding() {
        let data: Vec<u8> = (0u8..=200).collect();
        for split in [1usize, 2, 4, 7, 64] {
            let mut encoder = ChunkEncoder::new(BlobEncoding::Base64);
            let mut out = Vec::new();
            for chunk in data.chunks(split) {
                out.extend_from_slice(&encoder.push(chunk));
            }
            out.extend_from_slice(&encoder.finish());
            assert_eq!(out, encode_for_store(BlobEncoding::Base64, &data).to_vec());
        }
    }

    #[test]
    fn test_chunk_encoder_holds_back_partial_groups() {
        let mut encoder = ChunkEncoder::new(BlobEncoding::Base64);
        assert!(encoder.push(b"he").is_empty());
        assert_eq!(encoder.push(b"l"), Bytes::from_static(b"aGVs"));
        assert_eq!(encoder.finish(), Bytes::new());
    }
}
