//! Integration tests for the Almanac synchronization core

mod reconcile_flow;
mod sync_cli;
mod tombstone_cli;
