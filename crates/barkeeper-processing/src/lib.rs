//! Barkeeper Processing Library
//!
//! Content-level helpers used by ingestion: key derivation, content
//! sniffing, base64 and data-URL handling, and the upload policy validator.

pub mod encoding;
pub mod fingerprint;
pub mod sniff;
pub mod validator;

pub use encoding::{
    decode_base64, decode_base64_entry, decode_base64_forgiving, encode_for_store, ChunkEncoder,
    DecodeError, DecodedEntry,
};
pub use fingerprint::{identify, random_token, sha256_hex};
pub use sniff::{ContentSniffer, InferSniffer, SniffResult, DEFAULT_MIMETYPE};
pub use validator::{FieldPolicyValidator, PolicyRejection};
