use crate::harness::{Assertion, Scenario, TestWorkspace};
use ckpt_core::{CheckpointRequest, GcOptions, RestoreOptions};
use std::fs;

const AGGRESSIVE: GcOptions = GcOptions {
    dry_run: false,
    aggressive: true,
};

#[test]
fn test_interrupted_swap_rolls_back_on_open() {
    Scenario::new("interrupted_swap")
        .writes("app.js", b"v1")
        .checkpoints("v1")
        .writes("app.js", b"v2")
        .commits("Ship v2")
        .assert_commit_count(3)
        .crashes_mid_restore()
        .reopens()
        .assert_file("app.js", b"v2")
        .assert_file_missing("partial.txt")
        .assert(Assertion::NoLeftoverTrees)
        .assert_commit_count(3)
        .assert_head_contains("Ship v2")
        .assert_consistent()
        // The repaired repository restores normally
        .restores("v1")
        .assert_file("app.js", b"v1")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_swap_cut_before_history_move_is_reattached() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "app.js", b"v1").unwrap();
    let v1 = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("v1"))
        .unwrap();
    ws.write_file(&repo, "app.js", b"v2").unwrap();
    svc.commit(&mut repo, "Ship v2", None).unwrap();

    // Incoming tree already live, history still in the displaced tree
    let live = repo.tree_root();
    let displaced = repo.repo_dir().join("tree.old-crashed");
    fs::rename(&live, &displaced).unwrap();
    fs::create_dir_all(&live).unwrap();
    for entry in fs::read_dir(ws.snapshot_dir(&v1.id)).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), live.join(entry.file_name())).unwrap();
    }

    let mut repo = ws.open_repo("alice", "todo").unwrap();
    assert!(!displaced.exists());
    assert_eq!(ws.read_file(&repo, "app.js").unwrap(), b"v1");

    let report = svc.verify(&repo).unwrap();
    assert!(!report.has_issues(), "{}", report.summary());
    assert_eq!(report.commit_count, 3);

    let result = svc.commit(&mut repo, "Finish restore", None).unwrap();
    assert!(result.changed);
}

#[test]
fn test_verify_reports_dangling_and_missing() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "a.txt", b"a").unwrap();
    let gone = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("gone"))
        .unwrap();
    let hollow = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("hollow"))
        .unwrap();
    let intact = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("intact"))
        .unwrap();

    fs::remove_dir_all(svc.checkpoint_dir(&gone.id)).unwrap();
    fs::remove_dir_all(ws.snapshot_dir(&hollow.id)).unwrap();
    fs::create_dir_all(repo.repo_dir().join("tree.restore-stale")).unwrap();

    let report = svc.verify(&repo).unwrap();
    assert!(report.has_issues());
    assert_eq!(report.checkpoints_checked, 3);
    assert_eq!(report.dangling_refs, vec![gone.id.clone()]);
    assert_eq!(report.missing_snapshots, vec![hollow.id.clone()]);
    assert_eq!(report.leftover_trees.len(), 1);
    assert!(report.head.is_some());

    // Read-only: nothing was repaired
    assert!(repo.repo_dir().join("tree.restore-stale").exists());
    let listed = svc.list_checkpoints(&repo).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|c| c.id == intact.id));
}

#[test]
fn test_gc_reaps_staging_orphans_and_init_dirs() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();
    ws.write_file(&repo, "a.txt", b"a").unwrap();
    let kept = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("kept"))
        .unwrap();

    let checkpoints = svc.config().checkpoints_dir();
    let staging = checkpoints.join(".staging-0123456789ab-dead");
    fs::create_dir_all(staging.join("snapshot")).unwrap();
    fs::write(staging.join("snapshot/half.txt"), b"half").unwrap();
    let orphan = checkpoints.join("0123456789ab");
    fs::create_dir_all(orphan.join("snapshot")).unwrap();
    fs::write(orphan.join("snapshot/lost.txt"), b"lost").unwrap();
    let init = svc.config().repos_dir().join("alice").join(".draft.init-dead");
    fs::create_dir_all(&init).unwrap();

    // Everything is fresh, so the grace period protects it
    let report = svc.gc(GcOptions::default()).unwrap();
    assert_eq!(report.removed(), 0);

    let preview = svc
        .gc(GcOptions {
            dry_run: true,
            aggressive: true,
        })
        .unwrap();
    assert_eq!(preview.removed(), 3);
    assert!(staging.exists() && orphan.exists() && init.exists());

    let report = svc.gc(AGGRESSIVE).unwrap();
    assert_eq!(report.staging_removed, vec![staging.clone()]);
    assert_eq!(report.orphaned_checkpoints, vec!["0123456789ab".to_string()]);
    assert_eq!(report.init_dirs_removed, vec![init.clone()]);
    assert!(report.bytes_freed > 0);
    assert!(!staging.exists() && !orphan.exists() && !init.exists());

    assert!(svc.checkpoint_dir(&kept.id).is_dir());
    assert!(!svc.verify(&repo).unwrap().has_issues());
}

#[test]
fn test_gc_keeps_orphans_when_an_index_is_unreadable() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    ws.create_repo("alice", "todo").unwrap();

    let broken = svc.config().repos_dir().join("bob").join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("metadata.json"), b"{ not json").unwrap();

    let orphan = svc.config().checkpoints_dir().join("0123456789ab");
    fs::create_dir_all(orphan.join("snapshot")).unwrap();

    let report = svc.gc(AGGRESSIVE).unwrap();
    assert!(report.orphaned_checkpoints.is_empty());
    assert!(!report.errors.is_empty());
    assert!(orphan.exists());
}

#[test]
fn test_object_gc_keeps_history_intact() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "app.js", b"v1").unwrap();
    let v1 = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("v1"))
        .unwrap();
    ws.write_file(&repo, "app.js", b"v2").unwrap();
    svc.restore(&mut repo, &v1.id, RestoreOptions::default())
        .unwrap();
    let before = svc.history(&repo, 100, 0).unwrap();

    let report = svc.gc_objects(&repo, AGGRESSIVE).unwrap();
    assert!(report.objects_reachable > 0);
    assert!(report.objects_scanned >= report.objects_reachable);

    let after = svc.history(&repo, 100, 0).unwrap();
    assert_eq!(after, before);
    assert!(!svc.verify(&repo).unwrap().has_issues());
}

#[test]
fn test_health_counts_storage() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();
    ws.create_repo("bob", "notes").unwrap();
    svc.create_checkpoint(&mut repo, CheckpointRequest::new("one"))
        .unwrap();

    let health = svc.health().unwrap();
    assert!(health.healthy, "{:?}", health.problems);
    assert_eq!(health.repositories, 2);
    assert_eq!(health.checkpoints, 1);
    assert!(health.problems.is_empty());
}
