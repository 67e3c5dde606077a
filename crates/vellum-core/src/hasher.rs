//! Content addresses for embedded resources
//!
//! A resource is addressed by the SHA-256 of its logical path inside the
//! vault, not by its bytes. The same path always maps to the same key, so a
//! re-upload of an edited file replaces the previous object.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a vault-relative path
pub fn content_address(logical_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logical_path.as_bytes());
    hex::encode(hasher.finalize())
}
