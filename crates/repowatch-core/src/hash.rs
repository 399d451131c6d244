use crate::canon::canonical_json_bytes;
use sha2::{Digest, Sha256};

/// SHA-256 of `bytes` as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 over the canonical JSON form of `value`.
///
/// Two values that differ only in object key order produce the same digest.
pub fn canonical_digest(value: &serde_json::Value) -> anyhow::Result<String> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}
