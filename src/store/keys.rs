//! Composite key encoding for the sled trees.

use crate::types::EntityId;

const ID_PAD: usize = 20;

/// Key for one association or tombstone edge: `"{table}:{left:020}:{right:020}"`.
pub fn edge_key(table: &str, left: EntityId, right: EntityId) -> String {
    format!("{table}:{left:0ID_PAD$}:{right:0ID_PAD$}")
}

/// Prefix selecting every edge under one parent in one table.
pub fn edge_prefix(table: &str, parent: EntityId) -> String {
    format!("{table}:{parent:0ID_PAD$}:")
}

/// Key for one entity fingerprint: `"{entity_type}:{entity_id:020}"`.
pub fn entity_key(entity_type: &str, entity_id: EntityId) -> String {
    format!("{entity_type}:{entity_id:0ID_PAD$}")
}

/// Expiry index key: `"{expires_ms:020}:{edge key}"`.
///
/// Millisecond timestamps sort lexicographically when zero-padded, so a range
/// scan up to `as_of` finds exactly the expired set.
pub fn expiry_key(expires_ms: i64, edge: &str) -> String {
    format!("{expires_ms:0ID_PAD$}:{edge}")
}

/// Upper bound (exclusive) for scanning expiry index entries up to `as_of_ms`.
pub fn expiry_scan_end(as_of_ms: i64) -> String {
    // One past the last key that could carry this timestamp.
    format!("{:0ID_PAD$};", as_of_ms)
}

/// Extract the related-entity id from the final segment of an edge key.
pub fn related_id_from_edge_key(key: &str) -> Option<EntityId> {
    key.rsplit(':').next()?.parse().ok()
}
