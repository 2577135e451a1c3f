//! Integration tests for the tombstone maintenance commands.

use almanac::cli::{Commands, RunContext, TombstoneCommands};
use almanac::types::SyncSource;
use tempfile::TempDir;

fn context(dir: &TempDir) -> RunContext {
    RunContext::new(Some(dir.path().join("store")), None).unwrap()
}

#[test]
fn list_and_stats_reflect_created_tombstones() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.tombstones()
        .create(
            "entry_people",
            42,
            7,
            "importer",
            SyncSource::PrimaryImport,
            Some("removed_from_source"),
            Some(chrono::Duration::days(90)),
        )
        .unwrap();
    ctx.tombstones()
        .create("entry_places", 42, 3, "cli", SyncSource::Manual, None, None)
        .unwrap();

    let out = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::List {
                table: None,
                limit: None,
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(out.contains("entry_people"));
    assert!(out.contains("entry_places"));

    let filtered = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::List {
                table: Some("entry_people".to_string()),
                limit: None,
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(filtered.contains("entry_people"));
    assert!(!filtered.contains("entry_places"));

    let stats = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Stats {
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(stats.contains("2 total"));
}

#[test]
fn cleanup_dry_run_then_real_run() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    // Already-expired tombstone: negative TTL puts expires_at in the past.
    ctx.tombstones()
        .create(
            "entry_people",
            1,
            2,
            "importer",
            SyncSource::PrimaryImport,
            None,
            Some(chrono::Duration::days(-1)),
        )
        .unwrap();

    let dry = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Cleanup { dry_run: true },
        })
        .unwrap();
    assert!(dry.contains("Would remove 1"));
    assert!(ctx.tombstones().exists("entry_people", 1, 2).unwrap());

    let real = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Cleanup { dry_run: false },
        })
        .unwrap();
    assert!(real.contains("Removed 1"));
    assert!(!ctx.tombstones().exists("entry_people", 1, 2).unwrap());
}

#[test]
fn remove_with_force_deletes_and_reports_missing() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.tombstones()
        .create("entry_people", 5, 6, "cli", SyncSource::Manual, None, None)
        .unwrap();

    let out = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Remove {
                table: "entry_people".to_string(),
                left_id: 5,
                right_id: 6,
                force: true,
            },
        })
        .unwrap();
    assert!(out.contains("Removed tombstone"));

    let again = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Remove {
                table: "entry_people".to_string(),
                left_id: 5,
                right_id: 6,
                force: true,
            },
        })
        .unwrap();
    assert!(again.contains("No tombstone found"));
}

#[test]
fn validation_errors_surface_from_the_route() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let err = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::Remove {
                table: "entry_people".to_string(),
                left_id: 0,
                right_id: 6,
                force: true,
            },
        })
        .unwrap_err();
    assert_eq!(almanac::cli::exit_code(&err), 1);
}

#[test]
fn json_output_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.tombstones()
        .create("entry_people", 1, 2, "cli", SyncSource::Manual, None, None)
        .unwrap();

    let out = ctx
        .execute(&Commands::Tombstone {
            command: TombstoneCommands::List {
                table: None,
                limit: None,
                format: "json".to_string(),
            },
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["sync_source"], "manual");
}
