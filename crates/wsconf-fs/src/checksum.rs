//! SHA-256 checksum utilities
//!
//! Checksums name cache folders and let callers skip work when a file's
//! content did not change between two reads.

use sha2::{Digest, Sha256};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of content.
///
/// Returns a string in the canonical format `"sha256:<hex>"`.
pub fn compute_content_checksum(content: &[u8]) -> String {
    format!("{}{}", PREFIX, compute_hex_digest(content))
}

/// Bare lowercase hex digest, safe to use as a directory name.
pub fn compute_hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
