//! End-to-end reconciliation flow: the disconnected-machines story.
//!
//! Each "machine" is its own database importing desired-state snapshots of
//! the shared file set. Deletions must propagate through tombstones instead
//! of being resurrected by stale snapshots, and divergent edits must surface
//! as advisory conflicts.

use almanac::associations::AssociationStore;
use almanac::fingerprint::content_fingerprint;
use almanac::reconcile::{ReconcileMode, RelationshipReconciler};
use almanac::store::Database;
use almanac::sync_state::SyncStateTracker;
use almanac::tombstone::TombstoneStore;
use almanac::types::SyncSource;
use std::collections::BTreeSet;
use tempfile::TempDir;

struct Machine {
    _dir: TempDir,
    assoc: AssociationStore,
    tombstones: TombstoneStore,
    tracker: SyncStateTracker,
    reconciler: RelationshipReconciler,
}

impl Machine {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let tombstones = TombstoneStore::new(&db);
        let reconciler = RelationshipReconciler::new(
            &db,
            tombstones.clone(),
            Some(chrono::Duration::days(90)),
        );
        Machine {
            _dir: dir,
            assoc: AssociationStore::new(&db),
            tombstones,
            tracker: SyncStateTracker::new(&db),
            reconciler,
        }
    }

    fn import(&self, parent: i64, people: &[i64]) {
        let desired: BTreeSet<i64> = people.iter().copied().collect();
        self.reconciler
            .reconcile(
                parent,
                "entry_people",
                &desired,
                ReconcileMode::Replace,
                SyncSource::PrimaryImport,
                "file-importer",
            )
            .unwrap();
        let canonical = format!("entry {}: people={:?}", parent, desired);
        self.tracker
            .record_sync(
                "entry",
                parent,
                &content_fingerprint(canonical.as_bytes()),
                SyncSource::PrimaryImport,
                "machine-a",
                false,
            )
            .unwrap();
    }
}

#[test]
fn deletion_survives_a_stale_re_import() {
    let machine = Machine::new();

    // Initial import, then the user removes person 7 from the source file.
    machine.import(42, &[7, 8, 9]);
    machine.import(42, &[8, 9]);
    assert!(machine.tombstones.exists("entry_people", 42, 7).unwrap());

    // A stale snapshot (e.g. an unmerged branch) still lists 7.
    machine.import(42, &[7, 8, 9]);
    assert_eq!(
        machine.assoc.related_ids("entry_people", 42).unwrap(),
        BTreeSet::from([8, 9]),
        "tombstoned association must not be resurrected"
    );
}

#[test]
fn divergent_edits_on_two_machines_flag_a_conflict() {
    let a = Machine::new();

    // Machine A writes one version of entry 1, then imports machine B's
    // divergent version of the same entry from the shared repository.
    a.tracker
        .record_sync(
            "entry",
            1,
            &content_fingerprint(b"entry 1: people=[7]"),
            SyncSource::PrimaryImport,
            "machine-a",
            false,
        )
        .unwrap();
    a.tracker
        .record_sync(
            "entry",
            1,
            &content_fingerprint(b"entry 1: people=[8]"),
            SyncSource::PrimaryImport,
            "machine-b",
            false,
        )
        .unwrap();

    assert!(a.tracker.has_conflict("entry", 1).unwrap());

    // The human inspects, confirms the merge, and resolves.
    a.tracker.resolve("entry", 1).unwrap();
    assert!(!a.tracker.has_conflict("entry", 1).unwrap());
}

#[test]
fn explicit_re_add_round_trip() {
    let machine = Machine::new();
    machine.import(42, &[7]);
    machine.import(42, &[]);

    // User explicitly re-adds person 7 through the UI.
    machine
        .reconciler
        .force_add(42, "entry_people", 7, SyncSource::Manual, "user")
        .unwrap();
    assert!(!machine.tombstones.exists("entry_people", 42, 7).unwrap());

    // The next import sees 7 in the source and keeps it.
    machine.import(42, &[7]);
    assert_eq!(
        machine.assoc.related_ids("entry_people", 42).unwrap(),
        BTreeSet::from([7])
    );
}

#[test]
fn independent_parents_do_not_interfere() {
    let machine = Machine::new();
    machine.import(1, &[10, 11]);
    machine.import(2, &[10]);
    machine.import(1, &[11]);

    assert_eq!(
        machine.assoc.related_ids("entry_people", 1).unwrap(),
        BTreeSet::from([11])
    );
    assert_eq!(
        machine.assoc.related_ids("entry_people", 2).unwrap(),
        BTreeSet::from([10]),
        "tombstone for parent 1 must not affect parent 2"
    );
    assert!(machine.tombstones.exists("entry_people", 1, 10).unwrap());
    assert!(!machine.tombstones.exists("entry_people", 2, 10).unwrap());
}
