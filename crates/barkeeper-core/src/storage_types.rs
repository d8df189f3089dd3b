use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Blob store backend types
///
/// Defined in core because configuration selects the backend before the
/// storage crate builds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Redis,
    Memory,
}

impl FromStr for BlobBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(BlobBackend::Redis),
            "memory" => Ok(BlobBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid blob backend: {}", s)),
        }
    }
}

impl Display for BlobBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BlobBackend::Redis => write!(f, "redis"),
            BlobBackend::Memory => write!(f, "memory"),
        }
    }
}

/// How the cache key of an accepted file is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Hex SHA-256 of the file bytes. Identical content shares a key.
    #[default]
    Hash,
    /// Fresh random token per file, independent of content.
    Token,
}

impl FromStr for IdentityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" | "sha256" => Ok(IdentityMode::Hash),
            "token" | "uuid" => Ok(IdentityMode::Token),
            _ => Err(anyhow::anyhow!("Invalid identity mode: {}", s)),
        }
    }
}

impl Display for IdentityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IdentityMode::Hash => write!(f, "hash"),
            IdentityMode::Token => write!(f, "token"),
        }
    }
}

/// Encoding of the value written to the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobEncoding {
    /// Standard base64 text, the format downstream cache readers expect.
    #[default]
    Base64,
    /// The file bytes as received.
    Raw,
}

impl FromStr for BlobEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base64" => Ok(BlobEncoding::Base64),
            "raw" | "binary" => Ok(BlobEncoding::Raw),
            _ => Err(anyhow::anyhow!("Invalid blob encoding: {}", s)),
        }
    }
}
