use crate::harness::{Scenario, TestWorkspace};
use ckpt_core::{
    tree_fingerprint, CheckpointRequest, CkptError, ErrorCategory, RestoreOptions,
};
use std::fs;

#[test]
fn test_restore_brings_back_nested_and_deleted_files() {
    Scenario::new("nested_restore")
        .writes("src/lib/util.js", b"export const x = 1;")
        .writes("docs/guide/intro.md", b"# Intro")
        .checkpoints("base")
        .deletes("docs")
        .writes("src/lib/util.js", b"export const x = 2;")
        .writes("scratch/tmp.txt", b"scratch")
        .restores("base")
        .assert_file("src/lib/util.js", b"export const x = 1;")
        .assert_file("docs/guide/intro.md", b"# Intro")
        .assert_file_missing("scratch")
        .assert_tree_matches("base")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_safety_checkpoint_captures_pre_restore_state() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "app.js", b"v1").unwrap();
    let v1 = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("v1"))
        .unwrap();

    ws.write_file(&repo, "app.js", b"v2").unwrap();
    ws.write_file(&repo, "notes/todo.md", b"- ship it").unwrap();
    let before = ws.tree_hash(&repo).unwrap();

    let result = svc
        .restore(&mut repo, &v1.id, RestoreOptions::default())
        .unwrap();
    assert!(result.changed);
    assert_eq!(result.message, "Restore from checkpoint: v1");

    let safety = result.safety_checkpoint.unwrap();
    assert!(safety.name.starts_with(&format!("pre_restore_{}_", v1.id)));
    assert_eq!(
        safety.description,
        "Safety backup before restoring checkpoint v1"
    );
    let snapshot_hash =
        tree_fingerprint(&ws.snapshot_dir(&safety.id), svc.vcs().internal_dir()).unwrap();
    assert_eq!(snapshot_hash, before);

    // Undo the restore through the safety checkpoint
    svc.restore(&mut repo, &safety.id, RestoreOptions::without_backup())
        .unwrap();
    assert_eq!(ws.tree_hash(&repo).unwrap(), before);
    assert_eq!(ws.read_file(&repo, "notes/todo.md").unwrap(), b"- ship it");
}

#[test]
fn test_restore_of_current_state_makes_no_commit() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "app.js", b"v1").unwrap();
    let v1 = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("v1"))
        .unwrap();
    let commits = svc.history(&repo, 10, 0).unwrap().total;

    let result = svc
        .restore(&mut repo, &v1.id, RestoreOptions::without_backup())
        .unwrap();
    assert!(!result.changed);
    assert_eq!(result.commit_hash, v1.commit_hash);
    assert_eq!(svc.history(&repo, 10, 0).unwrap().total, commits);
}

#[test]
fn test_foreign_checkpoint_is_rejected_before_any_change() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut alice = ws.create_repo("alice", "todo").unwrap();
    let mut bob = ws.create_repo("bob", "todo").unwrap();

    ws.write_file(&bob, "bob.txt", b"bob").unwrap();
    let foreign = svc
        .create_checkpoint(&mut bob, CheckpointRequest::new("bobs"))
        .unwrap();

    ws.write_file(&alice, "alice.txt", b"alice").unwrap();
    let before = ws.tree_hash(&alice).unwrap();

    let err = svc
        .restore(&mut alice, &foreign.id, RestoreOptions::default())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);

    assert_eq!(ws.tree_hash(&alice).unwrap(), before);
    assert!(svc.list_checkpoints(&alice).unwrap().is_empty());
}

#[test]
fn test_missing_snapshot_is_corrupt_state() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "app.js", b"v1").unwrap();
    let v1 = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("v1"))
        .unwrap();
    fs::remove_dir_all(ws.snapshot_dir(&v1.id)).unwrap();

    let err = svc
        .restore(&mut repo, &v1.id, RestoreOptions::default())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::CorruptState);
    // Validation failed, so no safety checkpoint was taken
    assert_eq!(svc.list_checkpoints(&repo).unwrap().len(), 1);
}

#[test]
fn test_truncated_snapshot_leaves_tree_untouched() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    ws.write_file(&repo, "a.txt", b"a").unwrap();
    ws.write_file(&repo, "b.txt", b"b").unwrap();
    let base = svc
        .create_checkpoint(&mut repo, CheckpointRequest::new("base"))
        .unwrap();
    fs::remove_file(ws.snapshot_dir(&base.id).join("b.txt")).unwrap();

    ws.write_file(&repo, "a.txt", b"changed").unwrap();
    let before = ws.tree_hash(&repo).unwrap();

    let err = svc
        .restore(&mut repo, &base.id, RestoreOptions::default())
        .unwrap_err();
    match &err {
        CkptError::RestoreFailed {
            safety_checkpoint, ..
        } => assert!(safety_checkpoint.is_some()),
        other => panic!("expected RestoreFailed, got {:?}", other),
    }

    assert_eq!(ws.tree_hash(&repo).unwrap(), before);
    let leftovers: Vec<_> = fs::read_dir(repo.repo_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("tree."))
        .collect();
    assert!(leftovers.is_empty());
}
