//! Content fingerprinting for sync-state tracking.
//!
//! Importers and `record_sync` must agree byte-for-byte on what gets hashed,
//! so the digest of the canonical serialized desired-state lives here.

/// Hex-encoded BLAKE3 digest of a canonical serialized record.
pub fn content_fingerprint(canonical: &[u8]) -> String {
    hex::encode(blake3::hash(canonical).as_bytes())
}
