//! Durable record of deliberately removed associations.
//!
//! A tombstone distinguishes "this edge never existed" from "this edge was
//! explicitly deleted". Reconciliation consults this store to keep stale
//! desired-state descriptions from resurrecting deleted associations after a
//! machine re-imports the shared file set.

use crate::error::{to_storage_data, to_storage_io, StorageError, SyncError};
use crate::retry;
use crate::store::{keys, map_tx_err, validate_id, validate_name, Database};
use crate::types::{EntityId, SyncSource};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::{Transactional, Tree};
use std::collections::BTreeMap;

/// Reason recorded when reconciliation removes an edge absent from the source.
pub const REASON_REMOVED_FROM_SOURCE: &str = "removed_from_source";

/// A deliberately removed association edge.
///
/// Identity is `(table, left_id, right_id)`; at most one live tombstone exists
/// per identity. Rows are created by reconciliation removals and deleted only
/// by an explicit re-add or by expiry cleanup, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub table: String,
    pub left_id: EntityId,
    pub right_id: EntityId,
    pub removed_at: DateTime<Utc>,
    pub removed_by: String,
    pub removal_reason: Option<String>,
    pub sync_source: SyncSource,
    /// None = permanent; cleanup never touches it.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tombstone {
    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= as_of)
    }
}

/// Aggregate counts for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TombstoneStats {
    pub total: u64,
    pub expired: u64,
    pub by_table: BTreeMap<String, u64>,
    pub by_sync_source: BTreeMap<String, u64>,
    pub by_removed_by: BTreeMap<String, u64>,
}

/// Store for tombstoned association edges plus their expiry index.
///
/// The expiry index tree is maintained atomically with the tombstone tree in
/// every mutation, so the cleanup sweep never sees a dangling entry.
#[derive(Clone)]
pub struct TombstoneStore {
    tombstones: Tree,
    expiry: Tree,
}

impl TombstoneStore {
    pub fn new(db: &Database) -> Self {
        Self {
            tombstones: db.tombstones().clone(),
            expiry: db.tombstone_expiry().clone(),
        }
    }

    /// Record a removed edge. Idempotent: an existing tombstone with the same
    /// identity is returned unchanged, without error.
    ///
    /// `ttl = None` creates a permanent tombstone, used only for explicit
    /// reason-coded deletions.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        table: &str,
        left_id: EntityId,
        right_id: EntityId,
        removed_by: &str,
        sync_source: SyncSource,
        reason: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<Tombstone, SyncError> {
        validate_identity(table, left_id, right_id)?;
        if removed_by.is_empty() {
            return Err(SyncError::Validation(
                "removed_by must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let candidate = Tombstone {
            table: table.to_string(),
            left_id,
            right_id,
            removed_at: now,
            removed_by: removed_by.to_string(),
            removal_reason: reason.map(str::to_string),
            sync_source,
            expires_at: ttl.map(|d| now + d),
        };
        let key = keys::edge_key(table, left_id, right_id);

        let stored = retry::with_backoff(retry::DEFAULT_ATTEMPTS, retry::DEFAULT_BASE_DELAY, || {
            self.create_tx(&key, &candidate)
        })?;
        Ok(stored)
    }

    /// Insert-or-return-existing inside one transaction over both trees.
    fn create_tx(&self, key: &str, candidate: &Tombstone) -> Result<Tombstone, StorageError> {
        (&self.tombstones, &self.expiry)
            .transaction(|(tombs, expiry)| {
                if let Some(raw) = tombs.get(key.as_bytes())? {
                    let existing: Tombstone = serde_json::from_slice(&raw)
                        .map_err(|e| ConflictableTransactionError::Abort(to_storage_data(key, e)))?;
                    return Ok(existing);
                }
                let value = serde_json::to_vec(candidate)
                    .map_err(|e| ConflictableTransactionError::Abort(to_storage_data(key, e)))?;
                tombs.insert(key.as_bytes(), value)?;
                if let Some(expires_at) = candidate.expires_at {
                    let idx = keys::expiry_key(expires_at.timestamp_millis(), key);
                    expiry.insert(idx.as_bytes(), key.as_bytes())?;
                }
                Ok(candidate.clone())
            })
            .map_err(map_tx_err)
    }

    /// Whether a tombstone exists for this identity.
    pub fn exists(
        &self,
        table: &str,
        left_id: EntityId,
        right_id: EntityId,
    ) -> Result<bool, SyncError> {
        validate_identity(table, left_id, right_id)?;
        let key = keys::edge_key(table, left_id, right_id);
        let present = self
            .tombstones
            .contains_key(key.as_bytes())
            .map_err(to_storage_io)?;
        Ok(present)
    }

    /// Fetch a tombstone if present.
    pub fn get(
        &self,
        table: &str,
        left_id: EntityId,
        right_id: EntityId,
    ) -> Result<Option<Tombstone>, SyncError> {
        validate_identity(table, left_id, right_id)?;
        let key = keys::edge_key(table, left_id, right_id);
        let Some(raw) = self.tombstones.get(key.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(|e| to_storage_data(&key, e))?;
        Ok(Some(parsed))
    }

    /// Delete a tombstone if present, returning whether anything was deleted.
    /// Repeated calls are safe no-ops after the first.
    pub fn remove(
        &self,
        table: &str,
        left_id: EntityId,
        right_id: EntityId,
    ) -> Result<bool, SyncError> {
        validate_identity(table, left_id, right_id)?;
        let key = keys::edge_key(table, left_id, right_id);
        let removed = retry::with_backoff(retry::DEFAULT_ATTEMPTS, retry::DEFAULT_BASE_DELAY, || {
            self.remove_tx(&key)
        })?;
        Ok(removed)
    }

    fn remove_tx(&self, key: &str) -> Result<bool, StorageError> {
        (&self.tombstones, &self.expiry)
            .transaction(|(tombs, expiry)| {
                let Some(raw) = tombs.get(key.as_bytes())? else {
                    return Ok(false);
                };
                let existing: Tombstone = serde_json::from_slice(&raw)
                    .map_err(|e| ConflictableTransactionError::Abort(to_storage_data(key, e)))?;
                tombs.remove(key.as_bytes())?;
                if let Some(expires_at) = existing.expires_at {
                    let idx = keys::expiry_key(expires_at.timestamp_millis(), key);
                    expiry.remove(idx.as_bytes())?;
                }
                Ok(true)
            })
            .map_err(map_tx_err)
    }

    /// List tombstones, optionally filtered by table, newest first.
    pub fn list(
        &self,
        table: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Tombstone>, SyncError> {
        if let Some(table) = table {
            validate_name("table name", table)?;
        }
        let mut out = Vec::new();
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            match table {
                Some(table) => {
                    let prefix = format!("{}:", table);
                    Box::new(self.tombstones.scan_prefix(prefix.as_bytes()))
                }
                None => Box::new(self.tombstones.iter()),
            };
        for result in iter {
            let (key, value) = result.map_err(to_storage_io)?;
            let row: Tombstone = serde_json::from_slice(&value)
                .map_err(|e| to_storage_data(&String::from_utf8_lossy(&key), e))?;
            out.push(row);
        }
        out.sort_by(|a, b| b.removed_at.cmp(&a.removed_at));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// All tombstones with a non-null `expires_at` at or before `as_of`.
    ///
    /// Served by the expiry index, so cost is proportional to the expired set.
    pub fn list_expired(&self, as_of: DateTime<Utc>) -> Result<Vec<Tombstone>, SyncError> {
        let mut out = Vec::new();
        for (_, edge_key) in self.expired_index_entries(as_of)? {
            let Some(raw) = self
                .tombstones
                .get(edge_key.as_bytes())
                .map_err(to_storage_io)?
            else {
                continue;
            };
            let row: Tombstone =
                serde_json::from_slice(&raw).map_err(|e| to_storage_data(&edge_key, e))?;
            if row.is_expired(as_of) {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Delete expired tombstones, returning how many were (or would be)
    /// deleted. With `dry_run` nothing is mutated.
    pub fn cleanup_expired(&self, as_of: DateTime<Utc>, dry_run: bool) -> Result<usize, SyncError> {
        let entries = self.expired_index_entries(as_of)?;
        if dry_run {
            // Count only entries whose tombstone row still agrees.
            return Ok(self.list_expired(as_of)?.len());
        }
        let mut removed = 0usize;
        for (idx_key, edge_key) in entries {
            let deleted = (&self.tombstones, &self.expiry)
                .transaction(|(tombs, expiry)| {
                    expiry.remove(idx_key.as_bytes())?;
                    let Some(raw) = tombs.get(edge_key.as_bytes())? else {
                        return Ok(false);
                    };
                    let row: Tombstone = serde_json::from_slice(&raw).map_err(|e| {
                        ConflictableTransactionError::Abort(to_storage_data(&edge_key, e))
                    })?;
                    // A stale index entry (row re-created with a later expiry)
                    // only loses its index record, not the tombstone.
                    if !row.is_expired(as_of) {
                        return Ok(false);
                    }
                    tombs.remove(edge_key.as_bytes())?;
                    Ok(true)
                })
                .map_err(map_tx_err)?;
            if deleted {
                removed += 1;
            }
        }
        tracing::info!(removed, "tombstone cleanup completed");
        Ok(removed)
    }

    /// Aggregate counts across the whole table.
    pub fn stats(&self) -> Result<TombstoneStats, SyncError> {
        let now = Utc::now();
        let mut stats = TombstoneStats::default();
        for result in self.tombstones.iter() {
            let (key, value) = result.map_err(to_storage_io)?;
            let row: Tombstone = serde_json::from_slice(&value)
                .map_err(|e| to_storage_data(&String::from_utf8_lossy(&key), e))?;
            stats.total += 1;
            if row.is_expired(now) {
                stats.expired += 1;
            }
            *stats.by_table.entry(row.table.clone()).or_insert(0) += 1;
            *stats
                .by_sync_source
                .entry(row.sync_source.to_string())
                .or_insert(0) += 1;
            *stats.by_removed_by.entry(row.removed_by.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    fn expired_index_entries(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SyncError> {
        let end = keys::expiry_scan_end(as_of.timestamp_millis());
        let mut out = Vec::new();
        for result in self.expiry.range::<&[u8], _>(..end.as_bytes()) {
            let (idx_key, edge_key) = result.map_err(to_storage_io)?;
            out.push((
                String::from_utf8_lossy(&idx_key).to_string(),
                String::from_utf8_lossy(&edge_key).to_string(),
            ));
        }
        Ok(out)
    }
}

fn validate_identity(table: &str, left_id: EntityId, right_id: EntityId) -> Result<(), SyncError> {
    validate_name("table name", table)?;
    validate_id("left id", left_id)?;
    validate_id("right id", right_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, TombstoneStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let store = TombstoneStore::new(&db);
        (dir, store)
    }

    #[test]
    fn create_is_idempotent() {
        let (_dir, store) = open_store();
        let first = store
            .create(
                "entry_people",
                1,
                2,
                "importer",
                SyncSource::PrimaryImport,
                Some(REASON_REMOVED_FROM_SOURCE),
                Some(Duration::days(90)),
            )
            .unwrap();
        let second = store
            .create(
                "entry_people",
                1,
                2,
                "someone-else",
                SyncSource::Manual,
                None,
                None,
            )
            .unwrap();
        // Second call returns the original row unchanged.
        assert_eq!(second, first);
        assert_eq!(store.list(None, None).unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_malformed_identity() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.create("", 1, 2, "a", SyncSource::Manual, None, None),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            store.create("t", 0, 2, "a", SyncSource::Manual, None, None),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = open_store();
        store
            .create("t", 1, 2, "a", SyncSource::Manual, None, None)
            .unwrap();
        assert!(store.remove("t", 1, 2).unwrap());
        assert!(!store.remove("t", 1, 2).unwrap());
        assert!(!store.exists("t", 1, 2).unwrap());
    }

    #[test]
    fn ttl_expiry_and_dry_run() {
        let (_dir, store) = open_store();
        store
            .create(
                "t",
                1,
                2,
                "a",
                SyncSource::PrimaryImport,
                None,
                Some(Duration::days(1)),
            )
            .unwrap();
        // Permanent tombstones never expire.
        store
            .create("t", 1, 3, "a", SyncSource::Manual, Some("privacy_request"), None)
            .unwrap();

        let later = Utc::now() + Duration::days(2);
        assert_eq!(store.list_expired(later).unwrap().len(), 1);

        let would_remove = store.cleanup_expired(later, true).unwrap();
        assert_eq!(would_remove, 1);
        assert!(store.exists("t", 1, 2).unwrap(), "dry run must not mutate");

        let removed = store.cleanup_expired(later, false).unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists("t", 1, 2).unwrap());
        assert!(store.exists("t", 1, 3).unwrap());
    }

    #[test]
    fn cleanup_before_expiry_is_a_no_op() {
        let (_dir, store) = open_store();
        store
            .create(
                "t",
                1,
                2,
                "a",
                SyncSource::PrimaryImport,
                None,
                Some(Duration::days(30)),
            )
            .unwrap();
        assert_eq!(store.cleanup_expired(Utc::now(), false).unwrap(), 0);
        assert!(store.exists("t", 1, 2).unwrap());
    }

    #[test]
    fn list_filters_by_table_and_limit() {
        let (_dir, store) = open_store();
        for right in 1..=5 {
            store
                .create("entry_people", 9, right, "a", SyncSource::Manual, None, None)
                .unwrap();
        }
        store
            .create("entry_places", 9, 1, "a", SyncSource::Manual, None, None)
            .unwrap();

        assert_eq!(store.list(Some("entry_people"), None).unwrap().len(), 5);
        assert_eq!(store.list(Some("entry_people"), Some(2)).unwrap().len(), 2);
        assert_eq!(store.list(None, None).unwrap().len(), 6);
    }

    #[test]
    fn stats_aggregates_by_dimension() {
        let (_dir, store) = open_store();
        store
            .create("a", 1, 2, "importer", SyncSource::PrimaryImport, None, None)
            .unwrap();
        store
            .create("a", 1, 3, "importer", SyncSource::SecondaryImport, None, None)
            .unwrap();
        store
            .create("b", 1, 2, "cli", SyncSource::Manual, None, None)
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.by_table["a"], 2);
        assert_eq!(stats.by_table["b"], 1);
        assert_eq!(stats.by_sync_source["manual"], 1);
        assert_eq!(stats.by_removed_by["importer"], 2);
    }

    #[test]
    fn re_creating_after_remove_updates_expiry_index() {
        let (_dir, store) = open_store();
        store
            .create(
                "t",
                1,
                2,
                "a",
                SyncSource::Manual,
                None,
                Some(Duration::days(1)),
            )
            .unwrap();
        store.remove("t", 1, 2).unwrap();
        store
            .create(
                "t",
                1,
                2,
                "a",
                SyncSource::Manual,
                None,
                Some(Duration::days(10)),
            )
            .unwrap();

        // Expired by day 2? No: the live row expires at day 10.
        let day2 = Utc::now() + Duration::days(2);
        assert_eq!(store.cleanup_expired(day2, false).unwrap(), 0);
        assert!(store.exists("t", 1, 2).unwrap());
    }
}
