//! CLI route: single route table and run context. Dispatches to domain
//! services and presentation.

use crate::cli::parse::{Commands, SyncCommands, TombstoneCommands};
use crate::cli::presentation;
use crate::config::{AlmanacConfig, ConfigLoader};
use crate::error::SyncError;
use crate::reconcile::RelationshipReconciler;
use crate::store::Database;
use crate::sync_state::SyncStateTracker;
use crate::tombstone::TombstoneStore;
use chrono::Utc;
use std::path::PathBuf;

/// Runtime context for CLI execution: configuration, database handle, and
/// domain services. Everything is injected from here; no ambient globals.
pub struct RunContext {
    config: AlmanacConfig,
    db: Database,
    tombstones: TombstoneStore,
    tracker: SyncStateTracker,
}

impl RunContext {
    /// Create a run context from an optional data-dir override and optional
    /// config path. Uses ConfigLoader only.
    pub fn new(
        data_dir: Option<PathBuf>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, SyncError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };

        let resolved = match data_dir {
            Some(dir) => dir,
            None => config.storage.resolve_data_dir()?,
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Storage(crate::error::StorageError::IoError(e)))?;
        }
        let db = Database::open(&resolved)?;
        let tombstones = TombstoneStore::new(&db);
        let tracker = SyncStateTracker::new(&db);
        tracing::debug!(data_dir = %resolved.display(), "run context initialized");

        Ok(Self {
            config,
            db,
            tombstones,
            tracker,
        })
    }

    pub fn config(&self) -> &AlmanacConfig {
        &self.config
    }

    pub fn tombstones(&self) -> &TombstoneStore {
        &self.tombstones
    }

    pub fn sync_tracker(&self) -> &SyncStateTracker {
        &self.tracker
    }

    /// Reconciler wired with the configured default TTL, for importer callers.
    pub fn reconciler(&self) -> RelationshipReconciler {
        RelationshipReconciler::new(&self.db, self.tombstones.clone(), self.config.sync.default_ttl())
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        match command {
            Commands::Tombstone { command } => self.execute_tombstone(command),
            Commands::Sync { command } => self.execute_sync(command),
        }
    }

    fn execute_tombstone(&self, command: &TombstoneCommands) -> Result<String, SyncError> {
        match command {
            TombstoneCommands::List {
                table,
                limit,
                format,
            } => {
                let rows = self.tombstones.list(table.as_deref(), *limit)?;
                presentation::format_tombstone_list(&rows, format)
            }
            TombstoneCommands::Stats { format } => {
                let stats = self.tombstones.stats()?;
                presentation::format_tombstone_stats(&stats, format)
            }
            TombstoneCommands::Cleanup { dry_run } => {
                let count = self.tombstones.cleanup_expired(Utc::now(), *dry_run)?;
                Ok(presentation::format_cleanup_result(count, *dry_run))
            }
            TombstoneCommands::Remove {
                table,
                left_id,
                right_id,
                force,
            } => {
                if !force && !confirm_removal(table, *left_id, *right_id)? {
                    return Ok("Aborted.".to_string());
                }
                let removed = self.tombstones.remove(table, *left_id, *right_id)?;
                Ok(presentation::format_tombstone_remove_result(
                    table, *left_id, *right_id, removed,
                ))
            }
        }
    }

    fn execute_sync(&self, command: &SyncCommands) -> Result<String, SyncError> {
        match command {
            SyncCommands::Status { format } => {
                let rows = self.tracker.list_all()?;
                presentation::format_sync_status(&rows, format)
            }
            SyncCommands::Stats { format } => {
                let stats = self.tracker.stats()?;
                presentation::format_sync_stats(&stats, format)
            }
            SyncCommands::Conflicts { format } => {
                let rows = self.tracker.list_conflicts()?;
                presentation::format_conflicts(&rows, format)
            }
            SyncCommands::Resolve {
                entity_type,
                entity_id,
            } => {
                self.tracker.resolve(entity_type, *entity_id)?;
                Ok(presentation::format_resolve_result(entity_type, *entity_id))
            }
        }
    }
}

/// Interactive confirmation for the destructive tombstone removal.
fn confirm_removal(table: &str, left_id: i64, right_id: i64) -> Result<bool, SyncError> {
    use dialoguer::Confirm;
    Confirm::new()
        .with_prompt(format!(
            "Remove tombstone ({}, {}, {})? The association may be silently re-added on the next import.",
            table, left_id, right_id
        ))
        .default(false)
        .interact()
        .map_err(|e| SyncError::Validation(format!("Confirmation failed: {}", e)))
}
