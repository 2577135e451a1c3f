//! Sled-backed persistence layer: database handle, tree names, and key encoding.
//!
//! All tables live in one sled database as named trees. Keys are composite
//! strings with zero-padded numeric segments so that sled's lexicographic
//! ordering matches numeric ordering, which keeps the expiry sweep a bounded
//! range scan instead of a full iteration.

pub mod keys;

use crate::error::{to_storage_io, StorageError};
use crate::types::EntityId;
use sled::{Db, Tree};
use std::path::Path;

/// Live association edges: `"{table}:{parent:020}:{related:020}"` -> AssociationRow JSON.
pub const TREE_ASSOCIATIONS: &str = "associations";
/// Tombstoned edges: `"{table}:{left:020}:{right:020}"` -> Tombstone JSON.
pub const TREE_TOMBSTONES: &str = "tombstones";
/// Expiry index: `"{expires_ms:020}:{edge key}"` -> edge key bytes.
pub const TREE_TOMBSTONE_EXPIRY: &str = "tombstone_expiry";
/// Per-entity fingerprints: `"{entity_type}:{entity_id:020}"` -> SyncState JSON.
pub const TREE_SYNC_STATE: &str = "sync_state";

/// Handle to the local embedded database and its trees.
///
/// Cheap to clone; trees share the underlying pagecache. Components receive
/// the trees they own from this handle rather than opening sled themselves.
#[derive(Clone)]
pub struct Database {
    db: Db,
    associations: Tree,
    tombstones: Tree,
    tombstone_expiry: Tree,
    sync_state: Tree,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        Self::from_db(db)
    }

    /// Wrap an already-open sled database.
    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let associations = db.open_tree(TREE_ASSOCIATIONS).map_err(to_storage_io)?;
        let tombstones = db.open_tree(TREE_TOMBSTONES).map_err(to_storage_io)?;
        let tombstone_expiry = db
            .open_tree(TREE_TOMBSTONE_EXPIRY)
            .map_err(to_storage_io)?;
        let sync_state = db.open_tree(TREE_SYNC_STATE).map_err(to_storage_io)?;
        Ok(Self {
            db,
            associations,
            tombstones,
            tombstone_expiry,
            sync_state,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn associations(&self) -> &Tree {
        &self.associations
    }

    pub fn tombstones(&self) -> &Tree {
        &self.tombstones
    }

    pub fn tombstone_expiry(&self) -> &Tree {
        &self.tombstone_expiry
    }

    pub fn sync_state(&self) -> &Tree {
        &self.sync_state
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

/// Collapse a sled transaction error into the storage taxonomy.
///
/// Aborts carry our own error; everything else is an engine-level failure.
pub fn map_tx_err(err: sled::transaction::TransactionError<StorageError>) -> StorageError {
    match err {
        sled::transaction::TransactionError::Abort(e) => e,
        sled::transaction::TransactionError::Storage(e) => to_storage_io(e),
    }
}

/// Reject malformed table or entity-type names before any I/O.
///
/// Names participate in composite keys, so the `:` delimiter is reserved.
pub fn validate_name(kind: &str, name: &str) -> Result<(), crate::error::SyncError> {
    if name.is_empty() {
        return Err(crate::error::SyncError::Validation(format!(
            "{} must not be empty",
            kind
        )));
    }
    if name.contains(':') {
        return Err(crate::error::SyncError::Validation(format!(
            "{} '{}' must not contain ':'",
            kind, name
        )));
    }
    Ok(())
}

/// Reject non-positive identifiers before any I/O.
pub fn validate_id(kind: &str, id: EntityId) -> Result<(), crate::error::SyncError> {
    if id <= 0 {
        return Err(crate::error::SyncError::Validation(format!(
            "{} must be positive, got {}",
            kind, id
        )));
    }
    Ok(())
}
