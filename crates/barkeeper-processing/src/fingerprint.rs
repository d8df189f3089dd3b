//! Cache key derivation.

use barkeeper_core::IdentityMode;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive the cache key for `data` under the given identity mode.
pub fn identify(mode: IdentityMode, data: &[u8]) -> String {
    match mode {
        IdentityMode::Hash => sha256_hex(data),
        IdentityMode::Token => random_token(),
    }
}

/// Lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fresh random token, unrelated to any content.
pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}
