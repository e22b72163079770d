use crate::harness::{Scenario, TestWorkspace};
use anyhow::ensure;
use ckpt_core::{
    Api, ApiRequest, DecisionKind, ErrorCategory, MigrationContext,
    TranscriptMessage, NO_HISTORY_SUMMARY,
};
use serde_json::json;

fn chat() -> Vec<TranscriptMessage> {
    let turns = [
        ("user", "Hi"),
        ("assistant", "Hello! What are we making today?"),
        ("user", "Please create a flutter app for recipes"),
        ("assistant", "Scaffolded the project"),
        ("user", "Add a favourites tab"),
        ("assistant", "Added"),
        ("user", "Build the search screen next"),
        ("assistant", "Search is in"),
        ("user", "Looks great"),
        ("assistant", "Anything else?"),
        ("user", "Deploy it to the beta channel"),
        ("user", "Thanks!"),
    ];
    turns
        .iter()
        .enumerate()
        .map(|(i, (role, content))| {
            TranscriptMessage::new(*role, *content).with_timestamp(format!("2024-05-01T10:{:02}:00Z", i))
        })
        .collect()
}

#[test]
fn test_migration_stores_digest_checkpoint() {
    Scenario::new("migration")
        .writes("lib/main.dart", b"void main() {}")
        .migrates("handoff", "chat-1", "chat-2", chat())
        .assert_checkpoint_names(&["context_migration_chat-1_to_chat-2"])
        .assert_head_contains("Auto-commit before checkpoint: context_migration_chat-1_to_chat-2")
        .assert_custom(|svc, repo| {
            let checkpoint = svc
                .list_checkpoints(repo)?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("missing checkpoint"))?;
            ensure!(checkpoint.description == "Context migration from chat chat-1 to chat-2");

            let context: MigrationContext = checkpoint.context.to_typed()?;
            ensure!(context.old_session_id == "chat-1");
            ensure!(context.new_session_id == "chat-2");
            ensure!(context.full_history_length == 12);

            let digest = &context.chat_digest;
            ensure!(digest.summary == "Chat session with 12 messages (7 user, 5 assistant)");
            ensure!(digest.project_details.project_type.as_deref() == Some("mobile_app"));
            ensure!(digest.project_details.framework.as_deref() == Some("flutter"));

            let kinds: Vec<DecisionKind> = digest.key_decisions.iter().map(|d| d.kind).collect();
            ensure!(
                kinds
                    == [
                        DecisionKind::CreationRequest,
                        DecisionKind::CreationRequest,
                        DecisionKind::DeploymentAction
                    ],
                "unexpected decisions: {:?}",
                kinds
            );
            ensure!(digest.key_decisions[2].timestamp == "2024-05-01T10:10:00Z");
            Ok(())
        })
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_migration_of_empty_transcript() {
    let ws = TestWorkspace::empty().unwrap();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    let result = ws
        .service()
        .migrate_context(&mut repo, "a", "b", &[])
        .unwrap();
    assert_eq!(result.digest.summary, NO_HISTORY_SUMMARY);
    assert_eq!(result.digest.message_count, 0);
    assert!(result.digest.key_decisions.is_empty());
    assert_eq!(result.checkpoint.name, "context_migration_a_to_b");
}

#[test]
fn test_blank_session_ids_write_nothing() {
    let ws = TestWorkspace::empty().unwrap();
    let svc = ws.service();
    let mut repo = ws.create_repo("alice", "todo").unwrap();

    for (old, new) in [("", "chat-2"), ("chat-1", "  ")] {
        let err = svc.migrate_context(&mut repo, old, new, &chat()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidArgument);
    }
    assert!(svc.list_checkpoints(&repo).unwrap().is_empty());
}

#[test]
fn test_migration_through_api_envelope() {
    let ws = TestWorkspace::empty().unwrap();
    let api = Api::new(ws.reopen_service().unwrap());

    let create: ApiRequest = serde_json::from_value(json!({
        "op": "create_repository",
        "user_id": "alice",
        "project_id": "recipes",
        "project_name": "Recipes"
    }))
    .unwrap();
    let created = api.handle(create);
    assert!(created.success, "{:?}", created.error);
    assert_eq!(created.status, 200);

    let migrate: ApiRequest = serde_json::from_value(json!({
        "op": "migrate",
        "user_id": "alice",
        "project_id": "recipes",
        "old_chat_id": "chat-1",
        "new_chat_id": "chat-2",
        "chat_history": [
            {"role": "user", "content": "create an app", "timestamp": "t1"},
            {"role": "assistant", "content": "ok"}
        ]
    }))
    .unwrap();
    let migrated = api.handle(migrate);
    assert!(migrated.success, "{:?}", migrated.error);
    let data = migrated.data.unwrap();
    assert_eq!(data["digest"]["message_count"], 2);
    assert_eq!(data["digest"]["key_decisions"][0]["type"], "creation_request");

    let blank: ApiRequest = serde_json::from_value(json!({
        "op": "migrate",
        "user_id": "alice",
        "project_id": "recipes",
        "old_chat_id": "",
        "new_chat_id": "chat-2",
        "chat_history": []
    }))
    .unwrap();
    let rejected = api.handle(blank);
    assert!(!rejected.success);
    assert_eq!(rejected.status, 400);
    assert_eq!(rejected.error_kind.as_deref(), Some("invalid_argument"));
}
