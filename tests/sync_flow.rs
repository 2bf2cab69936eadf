//! End-to-end sync flow: session gate -> orchestrator -> save endpoint

use std::sync::Arc;

use synclinear::context::{GITHUB_STORAGE_KEY, LINEAR_STORAGE_KEY};
use synclinear::guard::{append_sync_footer, GuardDecision, LoopGuard, SyncEvent, SyncEventKind};
use synclinear::server::{self, AppState};
use synclinear::{
    build_attachment_mutation, ContextStore, EncryptionKey, GitHubContext, LinearContext,
    MemoryStore, SyncConfig, SyncError, SyncOrchestrator, SyncSession,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn orchestrator_for(api_url: String) -> SyncOrchestrator {
    SyncOrchestrator::new(&SyncConfig {
        api_url,
        ..SyncConfig::default()
    })
    .unwrap()
}

async fn spawn_save_endpoint(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_only_api_keys_does_not_submit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(0)
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(server.uri());

    let mut session = SyncSession::new(MemoryStore::new());
    session.set_linear(LinearContext::authorized("lin_api_0123456789"));
    session.set_github(GitHubContext::authorized("ghp_0123456789"));

    assert!(session.sync(&orchestrator).await.unwrap().is_none());
    assert!(!session.is_synced());
    // credentials stay cached until a save succeeds
    assert!(session.store().get(LINEAR_STORAGE_KEY).is_some());
    assert!(session.store().get(GITHUB_STORAGE_KEY).is_some());
}

#[tokio::test]
async fn test_rejection_keeps_state_unsynced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "rate limited" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(server.uri());

    let mut session = SyncSession::new(MemoryStore::new());
    session.set_linear(LinearContext {
        user_id: "lin-user".to_string(),
        team_id: "team-1".to_string(),
        api_key: "lin_api_0123456789".to_string(),
    });
    session.set_github(GitHubContext {
        user_id: "gh-user".to_string(),
        repo_id: "1296269".to_string(),
        api_key: "ghp_0123456789".to_string(),
    });

    let err = session.sync(&orchestrator).await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteRejection(_)));
    assert_eq!(err.user_message(), "rate limited");
    assert!(!session.is_synced());
    assert_eq!(session.linear().api_key, "lin_api_0123456789");
    assert_eq!(session.store().len(), 2);
}

#[tokio::test]
async fn test_unconfirmed_save_keeps_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;
    let orchestrator = orchestrator_for(server.uri());

    let mut session = SyncSession::new(MemoryStore::new());
    session.set_linear(LinearContext {
        user_id: "lin-user".to_string(),
        team_id: "team-1".to_string(),
        api_key: "lin_api_0123456789".to_string(),
    });
    session.set_github(GitHubContext {
        user_id: "gh-user".to_string(),
        repo_id: "1296269".to_string(),
        api_key: "ghp_0123456789".to_string(),
    });

    let err = session.sync(&orchestrator).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert!(!session.is_synced());
    assert_eq!(session.github().api_key, "ghp_0123456789");
    assert_eq!(session.store().len(), 2);
}

#[tokio::test]
async fn test_full_sync_encrypts_at_rest_and_clears_client() {
    let key = EncryptionKey::from_bytes(&[11u8; 32]).unwrap();
    let state = Arc::new(AppState::new(key));
    let api_url = spawn_save_endpoint(state.clone()).await;
    let orchestrator = orchestrator_for(api_url);

    let mut session = SyncSession::new(MemoryStore::new());
    session.set_linear(LinearContext::authorized("lin_api_0123456789"));
    session.set_github(GitHubContext::authorized("ghp_0123456789"));
    assert!(session.sync(&orchestrator).await.unwrap().is_none());

    // webhook deploy fills in the IDs
    let linear = LinearContext {
        user_id: "lin-user".to_string(),
        team_id: "team-1".to_string(),
        ..session.linear().clone()
    };
    let github = GitHubContext {
        user_id: "gh-user".to_string(),
        repo_id: "1296269".to_string(),
        ..session.github().clone()
    };
    session.set_linear(linear);
    session.set_github(github);
    assert!(session.readiness().complete);

    let receipt = session.sync(&orchestrator).await.unwrap().unwrap();
    assert_eq!(receipt.linear_team_id, "team-1");
    assert_eq!(receipt.github_repo_id, "1296269");

    assert!(session.is_synced());
    assert!(session.store().is_empty());
    assert!(session.linear().api_key.is_empty());
    assert!(session.github().api_key.is_empty());

    let record = state.lookup("team-1", "1296269").unwrap();
    assert_eq!(record.linear_api_key.init_vector.len(), 32);
    assert_eq!(record.linear_api_key(state.key()).unwrap(), "lin_api_0123456789");
    assert_eq!(record.github_api_key(state.key()).unwrap(), "ghp_0123456789");
}

#[test]
fn test_mirrored_comment_is_not_mirrored_back() {
    let guard = LoopGuard;

    let original = SyncEvent::from_body(SyncEventKind::Comment, 42, "Looks good to me");
    assert_eq!(guard.check(&original), GuardDecision::Process);

    let mirrored = SyncEvent::from_body(
        SyncEventKind::Comment,
        42,
        &append_sync_footer("Looks good to me"),
    );
    assert_eq!(
        guard.check(&mirrored),
        GuardDecision::Skip(
            "Skipping over comment for issue #42 as it is caused by sync.".to_string()
        )
    );

    let query = build_attachment_mutation("issue-123", 42, "acme/repo");
    assert!(query.contains("https://github.com/acme/repo/issues/42"));
}
