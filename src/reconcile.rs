//! Tombstone-aware reconciliation of desired vs. stored association state.
//!
//! One call covers one parent record in one association table. The diff is
//! derived fresh from stored state, so a retried call after any failure is
//! harmless. All mutation happens in a single multi-tree transaction: readers
//! never observe an association removed without its tombstone present.

use crate::error::{to_storage_data, SyncError};
use crate::store::{keys, map_tx_err, validate_id, validate_name, Database};
use crate::associations::AssociationRow;
use crate::tombstone::{Tombstone, TombstoneStore, REASON_REMOVED_FROM_SOURCE};
use crate::types::{EntityId, SyncSource};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::{Transactional, Tree};
use std::collections::BTreeSet;

/// How a desired set is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Desired ids are additions only; existing edges are left untouched.
    Incremental,
    /// Desired set is the complete membership; absent edges become removals.
    Replace,
}

/// Computed change set for one reconciliation call. Ephemeral, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationDiff {
    pub to_add: BTreeSet<EntityId>,
    pub to_remove: BTreeSet<EntityId>,
    /// Adds suppressed because a tombstone records a prior explicit removal.
    pub skipped_as_tombstoned: BTreeSet<EntityId>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.skipped_as_tombstoned.is_empty()
    }
}

/// Pure diff computation: symmetric difference with tombstone suppression.
///
/// `tombstoned` is the subset of add candidates that carry a tombstone; the
/// caller looks those up before calling.
pub fn compute_diff(
    current: &BTreeSet<EntityId>,
    desired: &BTreeSet<EntityId>,
    mode: ReconcileMode,
    tombstoned: &BTreeSet<EntityId>,
) -> AssociationDiff {
    let candidates: BTreeSet<EntityId> = desired.difference(current).copied().collect();
    let skipped: BTreeSet<EntityId> = candidates.intersection(tombstoned).copied().collect();
    let to_add: BTreeSet<EntityId> = candidates.difference(&skipped).copied().collect();
    let to_remove = match mode {
        ReconcileMode::Replace => current.difference(desired).copied().collect(),
        ReconcileMode::Incremental => BTreeSet::new(),
    };
    AssociationDiff {
        to_add,
        to_remove,
        skipped_as_tombstoned: skipped,
    }
}

/// Orchestrates association mutation across the live edge tree and the
/// tombstone store. Owns no storage of its own.
#[derive(Clone)]
pub struct RelationshipReconciler {
    associations: Tree,
    tombstones: Tree,
    tombstone_expiry: Tree,
    store: TombstoneStore,
    /// TTL applied to tombstones created by removals; None = permanent.
    default_ttl: Option<Duration>,
}

impl RelationshipReconciler {
    pub fn new(db: &Database, store: TombstoneStore, default_ttl: Option<Duration>) -> Self {
        Self {
            associations: db.associations().clone(),
            tombstones: db.tombstones().clone(),
            tombstone_expiry: db.tombstone_expiry().clone(),
            store,
            default_ttl,
        }
    }

    /// Reconcile one parent's associations against a desired set.
    ///
    /// Tombstoned add candidates are silently skipped (deletion propagation);
    /// removals create tombstones with the default TTL. Everything commits in
    /// one transaction or not at all.
    pub fn reconcile(
        &self,
        parent_id: EntityId,
        table: &str,
        desired: &BTreeSet<EntityId>,
        mode: ReconcileMode,
        sync_source: SyncSource,
        actor: &str,
    ) -> Result<AssociationDiff, SyncError> {
        validate_name("table name", table)?;
        validate_id("parent id", parent_id)?;
        if actor.is_empty() {
            return Err(SyncError::Validation("actor must not be empty".to_string()));
        }
        for &id in desired {
            validate_id("related id", id)?;
        }

        let current = self.current_related(table, parent_id)?;
        let candidates: BTreeSet<EntityId> = desired.difference(&current).copied().collect();
        let mut tombstoned = BTreeSet::new();
        for &id in &candidates {
            if self.store.exists(table, parent_id, id)? {
                tombstoned.insert(id);
            }
        }
        let diff = compute_diff(&current, desired, mode, &tombstoned);
        if diff.to_add.is_empty() && diff.to_remove.is_empty() {
            tracing::debug!(table, parent_id, skipped = diff.skipped_as_tombstoned.len(), "nothing to apply");
            return Ok(diff);
        }

        self.apply(parent_id, table, &diff, sync_source, actor)?;
        tracing::info!(
            table,
            parent_id,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            skipped = diff.skipped_as_tombstoned.len(),
            "reconciliation applied"
        );
        Ok(diff)
    }

    /// Explicit re-add of a tombstoned pair: clears the tombstone (the only
    /// non-expiry clearing path) and inserts the association, atomically.
    ///
    /// Returns whether a tombstone was cleared. Idempotent: with no tombstone
    /// and the edge already present this is a no-op.
    pub fn force_add(
        &self,
        parent_id: EntityId,
        table: &str,
        related_id: EntityId,
        sync_source: SyncSource,
        actor: &str,
    ) -> Result<bool, SyncError> {
        validate_name("table name", table)?;
        validate_id("parent id", parent_id)?;
        validate_id("related id", related_id)?;
        if actor.is_empty() {
            return Err(SyncError::Validation("actor must not be empty".to_string()));
        }

        let edge = keys::edge_key(table, parent_id, related_id);
        let row = AssociationRow {
            table: table.to_string(),
            parent_id,
            related_id,
            added_at: Utc::now(),
            sync_source,
        };
        let row_bytes = serde_json::to_vec(&row).map_err(|e| to_storage_data(&edge, e))?;

        let cleared = (&self.associations, &self.tombstones, &self.tombstone_expiry)
            .transaction(|(assoc, tombs, expiry)| {
                let mut cleared = false;
                if let Some(raw) = tombs.get(edge.as_bytes())? {
                    let existing: Tombstone = serde_json::from_slice(&raw).map_err(|e| {
                        ConflictableTransactionError::Abort(to_storage_data(&edge, e))
                    })?;
                    tombs.remove(edge.as_bytes())?;
                    if let Some(expires_at) = existing.expires_at {
                        let idx = keys::expiry_key(expires_at.timestamp_millis(), &edge);
                        expiry.remove(idx.as_bytes())?;
                    }
                    cleared = true;
                }
                if assoc.get(edge.as_bytes())?.is_none() {
                    assoc.insert(edge.as_bytes(), row_bytes.clone())?;
                }
                Ok(cleared)
            })
            .map_err(map_tx_err)?;

        if cleared {
            tracing::info!(table, parent_id, related_id, actor, "tombstone cleared by explicit re-add");
        }
        Ok(cleared)
    }

    fn current_related(
        &self,
        table: &str,
        parent_id: EntityId,
    ) -> Result<BTreeSet<EntityId>, SyncError> {
        let prefix = keys::edge_prefix(table, parent_id);
        let mut out = BTreeSet::new();
        for result in self.associations.scan_prefix(prefix.as_bytes()) {
            let (key, _) = result.map_err(crate::error::to_storage_io)?;
            let key_str = String::from_utf8_lossy(&key);
            if let Some(id) = keys::related_id_from_edge_key(&key_str) {
                out.insert(id);
            }
        }
        Ok(out)
    }

    /// Apply a computed diff in one transaction across all three trees.
    ///
    /// Tombstone writes happen before the matching association deletes, and
    /// the whole batch commits together; a crash mid-call leaves everything
    /// exactly as it was.
    fn apply(
        &self,
        parent_id: EntityId,
        table: &str,
        diff: &AssociationDiff,
        sync_source: SyncSource,
        actor: &str,
    ) -> Result<(), SyncError> {
        let now = Utc::now();
        let mut inserts = Vec::new();
        for &id in &diff.to_add {
            let edge = keys::edge_key(table, parent_id, id);
            let row = AssociationRow {
                table: table.to_string(),
                parent_id,
                related_id: id,
                added_at: now,
                sync_source,
            };
            let bytes = serde_json::to_vec(&row).map_err(|e| to_storage_data(&edge, e))?;
            inserts.push((edge, bytes));
        }
        let mut removals = Vec::new();
        for &id in &diff.to_remove {
            let edge = keys::edge_key(table, parent_id, id);
            let tombstone = Tombstone {
                table: table.to_string(),
                left_id: parent_id,
                right_id: id,
                removed_at: now,
                removed_by: actor.to_string(),
                removal_reason: Some(REASON_REMOVED_FROM_SOURCE.to_string()),
                sync_source,
                expires_at: self.default_ttl.map(|d| now + d),
            };
            let bytes = serde_json::to_vec(&tombstone).map_err(|e| to_storage_data(&edge, e))?;
            removals.push((edge, bytes, tombstone.expires_at));
        }

        (&self.associations, &self.tombstones, &self.tombstone_expiry)
            .transaction(|(assoc, tombs, expiry)| {
                for (edge, bytes) in &inserts {
                    assoc.insert(edge.as_bytes(), bytes.clone())?;
                }
                for (edge, bytes, expires_at) in &removals {
                    // Keep an existing tombstone untouched (idempotent create).
                    if tombs.get(edge.as_bytes())?.is_none() {
                        tombs.insert(edge.as_bytes(), bytes.clone())?;
                        if let Some(expires_at) = expires_at {
                            let idx = keys::expiry_key(expires_at.timestamp_millis(), edge);
                            expiry.insert(idx.as_bytes(), edge.as_bytes())?;
                        }
                    }
                    assoc.remove(edge.as_bytes())?;
                }
                Ok(())
            })
            .map_err(map_tx_err)?;
        Ok(())
    }
}
