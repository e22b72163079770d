use crate::harness::{Assertion, Scenario, TestWorkspace};
use ckpt_core::{CheckpointRequest, CkptError, ErrorCategory, INITIAL_COMMIT_MESSAGE};

#[test]
fn test_new_repository_starts_with_seed_commit() {
    Scenario::new("fresh_repo")
        .assert_commit_count(1)
        .assert_head_contains(INITIAL_COMMIT_MESSAGE)
        .assert(Assertion::NoLastCommit)
        .assert_checkpoint_count(0)
        .assert_file_missing("app.js")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_commit_then_noop_commit() {
    Scenario::new("commits")
        .writes("app.js", b"console.log('v1')")
        .commits("Add app")
        .assert_commit_count(2)
        .assert_head_contains("Add app")
        .assert(Assertion::LastCommitRecorded)
        // Nothing changed: no new commit
        .commits("Again")
        .assert_commit_count(2)
        .assert_head_contains("Add app")
        .run()
        .unwrap();
}

#[test]
fn test_commit_only_listed_files() {
    Scenario::new("partial_commit")
        .writes("a.txt", b"a")
        .writes("b.txt", b"b")
        .commits_files("Only a", &["a.txt", "missing.txt"])
        .assert_commit_count(2)
        // b.txt is still pending, so the next full commit picks it up
        .commits("Rest")
        .assert_commit_count(3)
        .assert_head_contains("Rest")
        .run()
        .unwrap();
}

#[test]
fn test_checkpoint_round_trip() {
    Scenario::new("round_trip")
        .writes("app.js", b"v1")
        .checkpoints("v1")
        .assert_commit_count(2)
        .assert_head_contains("Auto-commit before checkpoint: v1")
        .writes("app.js", b"v2")
        .writes("extra.js", b"extra")
        .checkpoints("v2")
        .assert_commit_count(3)
        .restores("v1")
        .assert_file("app.js", b"v1")
        .assert_file_missing("extra.js")
        .assert_tree_matches("v1")
        .assert_head_contains("Restore from checkpoint: v1")
        .assert_commit_count(4)
        // v1, v2 and the safety checkpoint
        .assert_checkpoint_count(3)
        .assert(Assertion::LatestCheckpointNameStartsWith("pre_restore_".into()))
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_restore_without_backup_adds_no_checkpoint() {
    Scenario::new("no_backup")
        .writes("app.js", b"v1")
        .checkpoints("v1")
        .writes("app.js", b"v2")
        .restores_without_backup("v1")
        .assert_file("app.js", b"v1")
        .assert_checkpoint_count(1)
        .assert_checkpoint_names(&["v1"])
        .run()
        .unwrap();
}

#[test]
fn test_restore_unknown_checkpoint_changes_nothing() {
    Scenario::new("unknown_checkpoint")
        .writes("app.js", b"v1")
        .checkpoints("v1")
        .restore_fails("ffffffffffff", ErrorCategory::NotFound)
        .restore_fails("not-an-id", ErrorCategory::InvalidArgument)
        .assert_tree_matches("v1")
        .assert_checkpoint_count(1)
        .assert_commit_count(2)
        .run()
        .unwrap();
}

#[test]
fn test_checkpoints_listed_in_creation_order() {
    Scenario::new("ordering")
        .writes("a.txt", b"1")
        .checkpoints("first")
        .writes("a.txt", b"2")
        .checkpoints("second")
        .checkpoints("third")
        .assert_checkpoint_names(&["first", "second", "third"])
        .run()
        .unwrap();
}

#[test]
fn test_duplicate_repository_is_rejected() {
    let ws = TestWorkspace::empty().unwrap();
    ws.create_repo("alice", "todo").unwrap();

    let err = ws.create_repo("alice", "todo").unwrap_err();
    let core = err.downcast_ref::<CkptError>().unwrap();
    assert_eq!(core.category(), ErrorCategory::AlreadyExists);
}

#[test]
fn test_open_missing_repository() {
    let ws = TestWorkspace::empty().unwrap();
    let err = ws.open_repo("alice", "nothing").unwrap_err();
    let core = err.downcast_ref::<CkptError>().unwrap();
    assert_eq!(core.category(), ErrorCategory::NotFound);
}

#[test]
fn test_reopened_repository_sees_same_state() {
    let ws = TestWorkspace::empty().unwrap();
    let mut repo = ws.create_repo("alice", "todo").unwrap();
    ws.write_file(&repo, "src/main.rs", b"fn main() {}").unwrap();
    let checkpoint = ws
        .service()
        .create_checkpoint(&mut repo, CheckpointRequest::new("first"))
        .unwrap();

    let other = ws.reopen_service().unwrap();
    let reopened = other.open_repository("alice", "todo").unwrap();
    assert_eq!(reopened.created_at(), repo.created_at());
    assert_eq!(reopened.checkpoint_refs().len(), 1);
    assert_eq!(reopened.checkpoint_refs()[0].id, checkpoint.id);
    assert_eq!(
        other.get_checkpoint(&checkpoint.id).unwrap().name,
        "first"
    );
    assert_eq!(ws.tree_hash(&reopened).unwrap(), ws.tree_hash(&repo).unwrap());
}
