//! Per-entity fingerprint history and advisory conflict detection.
//!
//! Each machine records the content hash it last wrote for an entity. When an
//! incoming hash disagrees with the stored one and the write is not an
//! explicit resolution, the row is flagged as a conflict. Detection is a
//! side-channel signal, never a blocking gate: the incoming hash still wins
//! at the storage layer and a human clears the flag after inspecting.

use crate::error::{to_storage_data, to_storage_io, SyncError};
use crate::retry;
use crate::store::{keys, validate_id, validate_name, Database};
use crate::types::{EntityId, SyncSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::BTreeMap;

/// Fingerprint record for one logical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub entity_type: String,
    pub entity_id: EntityId,
    /// Digest of the canonical serialized desired-state as last written.
    pub content_hash: String,
    pub last_synced_at: DateTime<Utc>,
    pub sync_source: SyncSource,
    pub origin_machine: String,
    /// Advisory divergence flag; persists until explicitly resolved.
    pub conflict: bool,
    pub conflict_detected_at: Option<DateTime<Utc>>,
}

/// Aggregate counts for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub total: u64,
    pub conflicts_unresolved: u64,
    /// Rows that carry a detection timestamp but no live flag: a conflict was
    /// seen and later cleared.
    pub conflicts_resolved: u64,
    pub by_entity_type: BTreeMap<String, u64>,
    pub by_sync_source: BTreeMap<String, u64>,
    pub by_origin_machine: BTreeMap<String, u64>,
}

/// Tracker over the `sync_state` tree; exactly one row per
/// `(entity_type, entity_id)`.
#[derive(Clone)]
pub struct SyncStateTracker {
    tree: Tree,
}

impl SyncStateTracker {
    pub fn new(db: &Database) -> Self {
        Self {
            tree: db.sync_state().clone(),
        }
    }

    /// Upsert the fingerprint row for an entity.
    ///
    /// If a prior row exists with a different hash and `resolving` is false,
    /// the conflict flag is set (keeping the earliest detection timestamp of
    /// the current episode). The hash and sync metadata are overwritten either
    /// way: last write wins, detection is advisory.
    pub fn record_sync(
        &self,
        entity_type: &str,
        entity_id: EntityId,
        content_hash: &str,
        sync_source: SyncSource,
        origin_machine: &str,
        resolving: bool,
    ) -> Result<SyncState, SyncError> {
        validate_name("entity type", entity_type)?;
        validate_id("entity id", entity_id)?;
        if content_hash.is_empty() {
            return Err(SyncError::Validation(
                "content_hash must not be empty".to_string(),
            ));
        }

        let key = keys::entity_key(entity_type, entity_id);
        let now = Utc::now();
        let previous = self.read(&key)?;

        let mut row = SyncState {
            entity_type: entity_type.to_string(),
            entity_id,
            content_hash: content_hash.to_string(),
            last_synced_at: now,
            sync_source,
            origin_machine: origin_machine.to_string(),
            conflict: false,
            conflict_detected_at: None,
        };

        if let Some(prev) = previous {
            row.conflict = prev.conflict;
            row.conflict_detected_at = prev.conflict_detected_at;
            if resolving {
                row.conflict = false;
            } else if prev.content_hash != content_hash && !prev.conflict {
                tracing::warn!(
                    entity_type,
                    entity_id,
                    prior_hash = %prev.content_hash,
                    incoming_hash = %content_hash,
                    "divergent edit detected"
                );
                row.conflict = true;
                row.conflict_detected_at = Some(now);
            }
        }

        let value = serde_json::to_vec(&row).map_err(|e| to_storage_data(&key, e))?;
        retry::with_backoff(retry::DEFAULT_ATTEMPTS, retry::DEFAULT_BASE_DELAY, || {
            self.tree
                .insert(key.as_bytes(), value.clone())
                .map_err(to_storage_io)?;
            Ok(())
        })?;
        Ok(row)
    }

    /// Whether the entity currently carries an unresolved conflict flag.
    pub fn has_conflict(&self, entity_type: &str, entity_id: EntityId) -> Result<bool, SyncError> {
        validate_name("entity type", entity_type)?;
        validate_id("entity id", entity_id)?;
        let key = keys::entity_key(entity_type, entity_id);
        Ok(self.read(&key)?.map(|s| s.conflict).unwrap_or(false))
    }

    /// Fetch the fingerprint row for one entity.
    pub fn get(
        &self,
        entity_type: &str,
        entity_id: EntityId,
    ) -> Result<Option<SyncState>, SyncError> {
        validate_name("entity type", entity_type)?;
        validate_id("entity id", entity_id)?;
        self.read(&keys::entity_key(entity_type, entity_id))
    }

    /// All rows with a live conflict flag, most recently synced first.
    pub fn list_conflicts(&self) -> Result<Vec<SyncState>, SyncError> {
        let mut out: Vec<SyncState> = self
            .list_all()?
            .into_iter()
            .filter(|s| s.conflict)
            .collect();
        out.sort_by(|a, b| b.last_synced_at.cmp(&a.last_synced_at));
        Ok(out)
    }

    /// All fingerprint rows, most recently synced first.
    pub fn list_all(&self) -> Result<Vec<SyncState>, SyncError> {
        let mut out = Vec::new();
        for result in self.tree.iter() {
            let (key, value) = result.map_err(to_storage_io)?;
            let row: SyncState = serde_json::from_slice(&value)
                .map_err(|e| to_storage_data(&String::from_utf8_lossy(&key), e))?;
            out.push(row);
        }
        out.sort_by(|a, b| b.last_synced_at.cmp(&a.last_synced_at));
        Ok(out)
    }

    /// Clear the conflict flag after a human has inspected the divergence.
    ///
    /// The detection timestamp is kept so stats can count resolved episodes.
    pub fn resolve(&self, entity_type: &str, entity_id: EntityId) -> Result<(), SyncError> {
        validate_name("entity type", entity_type)?;
        validate_id("entity id", entity_id)?;
        let key = keys::entity_key(entity_type, entity_id);
        let Some(mut row) = self.read(&key)? else {
            return Err(SyncError::NotFound(format!(
                "no sync state for {} {}",
                entity_type, entity_id
            )));
        };
        row.conflict = false;
        let value = serde_json::to_vec(&row).map_err(|e| to_storage_data(&key, e))?;
        self.tree
            .insert(key.as_bytes(), value)
            .map_err(to_storage_io)?;
        tracing::info!(entity_type, entity_id, "conflict resolved");
        Ok(())
    }

    /// Aggregate counts across the whole table.
    pub fn stats(&self) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();
        for row in self.list_all()? {
            stats.total += 1;
            if row.conflict {
                stats.conflicts_unresolved += 1;
            } else if row.conflict_detected_at.is_some() {
                stats.conflicts_resolved += 1;
            }
            *stats
                .by_entity_type
                .entry(row.entity_type.clone())
                .or_insert(0) += 1;
            *stats
                .by_sync_source
                .entry(row.sync_source.to_string())
                .or_insert(0) += 1;
            *stats
                .by_origin_machine
                .entry(row.origin_machine.clone())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    fn read(&self, key: &str) -> Result<Option<SyncState>, SyncError> {
        let Some(raw) = self.tree.get(key.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(|e| to_storage_data(key, e))?;
        Ok(Some(parsed))
    }
}
