//! Almanac: deletion-safe synchronization core
//!
//! Keeps a personal records database consistent across machines that only
//! exchange state through a shared serialized file set. Tombstones record
//! deliberate association removals so a stale re-import cannot resurrect
//! them, and per-entity fingerprints surface divergent concurrent edits.

pub mod associations;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod sync_state;
pub mod tombstone;
pub mod types;
