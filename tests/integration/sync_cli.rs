//! Integration tests for the sync-state maintenance commands.

use almanac::cli::{Commands, RunContext, SyncCommands};
use almanac::error::SyncError;
use almanac::fingerprint::content_fingerprint;
use almanac::types::SyncSource;
use tempfile::TempDir;

fn context(dir: &TempDir) -> RunContext {
    RunContext::new(Some(dir.path().join("store")), None).unwrap()
}

#[test]
fn conflict_lifecycle_through_the_cli() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let hash_a = content_fingerprint(b"entry 1 v1");
    let hash_b = content_fingerprint(b"entry 1 v2");
    ctx.sync_tracker()
        .record_sync("entry", 1, &hash_a, SyncSource::PrimaryImport, "laptop", false)
        .unwrap();
    ctx.sync_tracker()
        .record_sync("entry", 1, &hash_b, SyncSource::PrimaryImport, "desktop", false)
        .unwrap();

    let conflicts = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Conflicts {
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(conflicts.contains("1 unresolved conflict"));

    let resolved = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Resolve {
                entity_type: "entry".to_string(),
                entity_id: 1,
            },
        })
        .unwrap();
    assert!(resolved.contains("Conflict cleared"));

    let after = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Conflicts {
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(after.contains("No unresolved conflicts"));
}

#[test]
fn resolve_unknown_entity_is_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let err = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Resolve {
                entity_type: "entry".to_string(),
                entity_id: 99,
            },
        })
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
    assert_eq!(almanac::cli::exit_code(&err), 1);
}

#[test]
fn status_and_stats_render_rows() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    ctx.sync_tracker()
        .record_sync(
            "entry",
            1,
            &content_fingerprint(b"entry 1"),
            SyncSource::PrimaryImport,
            "laptop",
            false,
        )
        .unwrap();
    ctx.sync_tracker()
        .record_sync(
            "person",
            2,
            &content_fingerprint(b"person 2"),
            SyncSource::Manual,
            "laptop",
            false,
        )
        .unwrap();

    let status = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Status {
                format: "text".to_string(),
            },
        })
        .unwrap();
    assert!(status.contains("entry"));
    assert!(status.contains("person"));

    let stats = ctx
        .execute(&Commands::Sync {
            command: SyncCommands::Stats {
                format: "json".to_string(),
            },
        })
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(parsed["total"], 2);
    assert_eq!(parsed["by_origin_machine"]["laptop"], 2);
}
