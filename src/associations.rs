//! Live many-to-many association edges.
//!
//! The reconciler owns all mutation of this tree (inside its transaction);
//! this module provides the row shape and the read surface.

use crate::error::{to_storage_data, to_storage_io, SyncError};
use crate::store::{keys, validate_id, validate_name, Database};
use crate::types::{EntityId, SyncSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use std::collections::BTreeSet;

/// One stored association edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRow {
    pub table: String,
    pub parent_id: EntityId,
    pub related_id: EntityId,
    pub added_at: DateTime<Utc>,
    pub sync_source: SyncSource,
}

/// Read access to the association tree.
#[derive(Clone)]
pub struct AssociationStore {
    tree: Tree,
}

impl AssociationStore {
    pub fn new(db: &Database) -> Self {
        Self {
            tree: db.associations().clone(),
        }
    }

    /// Related-entity ids currently associated with one parent.
    pub fn related_ids(
        &self,
        table: &str,
        parent_id: EntityId,
    ) -> Result<BTreeSet<EntityId>, SyncError> {
        validate_name("table name", table)?;
        validate_id("parent id", parent_id)?;
        let prefix = keys::edge_prefix(table, parent_id);
        let mut out = BTreeSet::new();
        for result in self.tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = result.map_err(to_storage_io)?;
            let row: AssociationRow = serde_json::from_slice(&value)
                .map_err(|e| to_storage_data(&String::from_utf8_lossy(&key), e))?;
            out.insert(row.related_id);
        }
        Ok(out)
    }

    /// Whether one specific edge exists.
    pub fn contains(
        &self,
        table: &str,
        parent_id: EntityId,
        related_id: EntityId,
    ) -> Result<bool, SyncError> {
        validate_name("table name", table)?;
        validate_id("parent id", parent_id)?;
        validate_id("related id", related_id)?;
        let key = keys::edge_key(table, parent_id, related_id);
        let present = self
            .tree
            .contains_key(key.as_bytes())
            .map_err(to_storage_io)?;
        Ok(present)
    }
}
