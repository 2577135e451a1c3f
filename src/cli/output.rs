//! CLI output: error mapping from domain errors to the stable CLI surface.

use crate::error::SyncError;

/// Map domain/service errors to a one-line diagnostic for CLI output.
pub fn map_error(e: &SyncError) -> String {
    e.to_string()
}

/// Stable exit codes: 0 success, 1 validation, 2 storage/backend.
pub fn exit_code(e: &SyncError) -> i32 {
    match e {
        SyncError::Validation(_) | SyncError::NotFound(_) => 1,
        SyncError::Storage(_) | SyncError::Config(_) => 2,
    }
}
