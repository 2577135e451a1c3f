//! CLI presentation: render domain results as text tables or JSON.

use crate::error::SyncError;
use crate::sync_state::{SyncState, SyncStats};
use crate::tombstone::{Tombstone, TombstoneStats};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::collections::BTreeMap;

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SyncError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Config(format!("Failed to render JSON output: {}", e)))
}

fn format_time(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_tombstone_list(rows: &[Tombstone], format: &str) -> Result<String, SyncError> {
    if format == "json" {
        return to_json(&rows);
    }
    if rows.is_empty() {
        return Ok("No tombstones.".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Table", "Left", "Right", "Removed at", "By", "Source", "Reason", "Expires",
    ]);
    for row in rows {
        table.add_row(vec![
            row.table.clone(),
            row.left_id.to_string(),
            row.right_id.to_string(),
            format_time(row.removed_at),
            row.removed_by.clone(),
            row.sync_source.to_string(),
            row.removal_reason.clone().unwrap_or_default(),
            row.expires_at
                .map(format_time)
                .unwrap_or_else(|| "permanent".to_string()),
        ]);
    }
    Ok(format!("{}", table))
}

pub fn format_tombstone_stats(stats: &TombstoneStats, format: &str) -> Result<String, SyncError> {
    if format == "json" {
        return to_json(stats);
    }
    let mut out = format!(
        "Tombstones: {} total, {} expired\n",
        stats.total, stats.expired
    );
    out.push_str(&breakdown_table("By table", &stats.by_table));
    out.push_str(&breakdown_table("By sync source", &stats.by_sync_source));
    out.push_str(&breakdown_table("By removed-by", &stats.by_removed_by));
    Ok(out.trim_end().to_string())
}

pub fn format_cleanup_result(count: usize, dry_run: bool) -> String {
    if dry_run {
        format!("Would remove {} expired tombstone(s)", count)
    } else {
        format!("Removed {} expired tombstone(s)", count)
    }
}

pub fn format_tombstone_remove_result(
    table: &str,
    left_id: i64,
    right_id: i64,
    removed: bool,
) -> String {
    if removed {
        format!(
            "Removed tombstone ({}, {}, {}); the association may be re-added",
            table, left_id, right_id
        )
    } else {
        format!("No tombstone found for ({}, {}, {})", table, left_id, right_id)
    }
}

pub fn format_sync_status(rows: &[SyncState], format: &str) -> Result<String, SyncError> {
    if format == "json" {
        return to_json(&rows);
    }
    if rows.is_empty() {
        return Ok("No sync state recorded.".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Entity", "Id", "Hash", "Last synced", "Source", "Machine", "Conflict",
    ]);
    for row in rows {
        let conflict = if row.conflict {
            "yes".red().to_string()
        } else {
            "no".to_string()
        };
        table.add_row(vec![
            row.entity_type.clone(),
            row.entity_id.to_string(),
            short_hash(&row.content_hash),
            format_time(row.last_synced_at),
            row.sync_source.to_string(),
            row.origin_machine.clone(),
            conflict,
        ]);
    }
    Ok(format!("{}", table))
}

pub fn format_sync_stats(stats: &SyncStats, format: &str) -> Result<String, SyncError> {
    if format == "json" {
        return to_json(stats);
    }
    let mut out = format!(
        "Sync state: {} total, {} unresolved conflict(s), {} resolved\n",
        stats.total, stats.conflicts_unresolved, stats.conflicts_resolved
    );
    out.push_str(&breakdown_table("By entity type", &stats.by_entity_type));
    out.push_str(&breakdown_table("By sync source", &stats.by_sync_source));
    out.push_str(&breakdown_table("By origin machine", &stats.by_origin_machine));
    Ok(out.trim_end().to_string())
}

pub fn format_conflicts(rows: &[SyncState], format: &str) -> Result<String, SyncError> {
    if format == "json" {
        return to_json(&rows);
    }
    if rows.is_empty() {
        return Ok("No unresolved conflicts.".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Entity", "Id", "Detected at", "Last source", "Machine"]);
    for row in rows {
        table.add_row(vec![
            row.entity_type.clone(),
            row.entity_id.to_string(),
            row.conflict_detected_at
                .map(format_time)
                .unwrap_or_default(),
            row.sync_source.to_string(),
            row.origin_machine.clone(),
        ]);
    }
    Ok(format!(
        "{} unresolved conflict(s):\n{}",
        rows.len(),
        table
    ))
}

pub fn format_resolve_result(entity_type: &str, entity_id: i64) -> String {
    format!("Conflict cleared for {} {}", entity_type, entity_id)
}

fn breakdown_table(title: &str, counts: &BTreeMap<String, u64>) -> String {
    if counts.is_empty() {
        return String::new();
    }
    let mut out = format!("\n{}:\n", title);
    for (key, count) in counts {
        out.push_str(&format!("  {:<24} {}\n", key, count));
    }
    out
}

fn short_hash(hash: &str) -> String {
    if hash.len() > 12 {
        hash[..12].to_string()
    } else {
        hash.to_string()
    }
}
