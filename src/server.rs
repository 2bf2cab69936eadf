//! Save endpoint
//!
//! `POST /api/save` receives the two contexts from the client, encrypts both
//! API keys with the process-wide key and keeps the encrypted pair in an
//! in-memory registry keyed by Linear team and GitHub repo. Plaintext keys are
//! wiped as soon as they are encrypted.
//!
//! Responses always carry a JSON object: `{}` on success, `{"error": ...}`
//! otherwise, which is what the orchestrator expects.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::{Method, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::SAVE_PATH;
use crate::context::{GitHubContext, LinearContext, ProviderContext};
use crate::crypto::{self, looks_like_api_key, EncryptedSecret, EncryptionKey};
use crate::errors::{Result, SyncError};
use crate::middleware::{request_id, RequestId};
use crate::orchestrator::{SavePayload, SaveResponse};

/// One stored Linear team <-> GitHub repo pair
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub linear_user_id: String,
    pub linear_team_id: String,
    pub linear_api_key: EncryptedSecret,
    pub github_user_id: String,
    pub github_repo_id: String,
    pub github_api_key: EncryptedSecret,
    pub created_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn linear_api_key(&self, key: &EncryptionKey) -> Result<String> {
        decrypt_checked(&self.linear_api_key, key)
    }

    pub fn github_api_key(&self, key: &EncryptionKey) -> Result<String> {
        decrypt_checked(&self.github_api_key, key)
    }
}

/// Decrypt and refuse anything that does not look like an API key
fn decrypt_checked(secret: &EncryptedSecret, key: &EncryptionKey) -> Result<String> {
    let plaintext = secret.decrypt(key)?;
    if !looks_like_api_key(&plaintext) {
        return Err(SyncError::Decryption(
            "decrypted value is not a well-formed API key".to_string(),
        ));
    }
    Ok(plaintext)
}

/// Registry key: (Linear team ID, GitHub repo ID). A tuple, so IDs that
/// contain separators cannot collide.
pub type RegistryKey = (String, String);

pub fn registry_key(team_id: &str, repo_id: &str) -> RegistryKey {
    (team_id.to_string(), repo_id.to_string())
}

pub struct AppState {
    key: EncryptionKey,
    records: DashMap<RegistryKey, SyncRecord>,
}

impl AppState {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            key,
            records: DashMap::new(),
        }
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn lookup(&self, team_id: &str, repo_id: &str) -> Option<SyncRecord> {
        self.records
            .get(&registry_key(team_id, repo_id))
            .map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validate, encrypt and store one pair
    pub fn register(&self, mut payload: SavePayload) -> Result<SyncRecord> {
        let outcome = self.encrypt_pair(&payload.linear, &payload.github);
        payload.linear.clear();
        payload.github.clear();

        let record = outcome?;
        self.records.insert(
            registry_key(&record.linear_team_id, &record.github_repo_id),
            record.clone(),
        );
        Ok(record)
    }

    fn encrypt_pair(&self, linear: &LinearContext, github: &GitHubContext) -> Result<SyncRecord> {
        check_context(linear)?;
        check_context(github)?;

        Ok(SyncRecord {
            linear_user_id: linear.user_id.clone(),
            linear_team_id: linear.team_id.clone(),
            linear_api_key: crypto::encrypt(&linear.api_key, &self.key)?,
            github_user_id: github.user_id.clone(),
            github_repo_id: github.repo_id.clone(),
            github_api_key: crypto::encrypt(&github.api_key, &self.key)?,
            created_at: Utc::now(),
        })
    }
}

fn check_context<C: ProviderContext>(context: &C) -> Result<()> {
    if !context.has_credentials() {
        return Err(SyncError::MissingCredentials(C::PROVIDER));
    }
    if !context.is_complete() {
        return Err(SyncError::InvalidContext(format!(
            "{} context is missing its team/repo ID",
            C::PROVIDER
        )));
    }
    context.validate()
}

async fn health() -> &'static str {
    "OK"
}

async fn save_sync(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    body: String,
) -> impl IntoResponse {
    let payload: SavePayload = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(request_id = %request_id, "Malformed save payload: {}", e);
            return reject(StatusCode::BAD_REQUEST, format!("Invalid request: {e}"));
        }
    };

    match state.register(payload) {
        Ok(record) => {
            info!(
                request_id = %request_id,
                team_id = %record.linear_team_id,
                repo_id = %record.github_repo_id,
                "Stored sync pair"
            );
            (StatusCode::OK, Json(SaveResponse::default()))
        }
        Err(e) => {
            warn!(request_id = %request_id, "Rejected sync pair: {}", e);
            let status = match e {
                SyncError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            reject(status, e.user_message())
        }
    }
}

fn reject(status: StatusCode, error: String) -> (StatusCode, Json<SaveResponse>) {
    (status, Json(SaveResponse { error: Some(error) }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(SAVE_PATH, post(save_sync))
        .layer(axum_middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(EncryptionKey::from_bytes(&[3u8; 32]).unwrap()))
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "github": { "userId": "gh-user", "repoId": "1296269", "apiKey": "ghp_0123456789" },
            "linear": { "userId": "lin-user", "teamId": "team-1", "apiKey": "lin_api_0123456789" },
        })
    }

    async fn post_save(state: Arc<AppState>, body: String) -> (StatusCode, serde_json::Value, bool) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(SAVE_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let has_request_id = response.headers().contains_key("x-request-id");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap(), has_request_id)
    }

    #[tokio::test]
    async fn test_save_encrypts_and_stores() {
        let state = state();
        let (status, body, has_request_id) = post_save(state.clone(), payload().to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));
        assert!(has_request_id);

        let record = state.lookup("team-1", "1296269").unwrap();
        assert_ne!(record.linear_api_key.ciphertext, hex::encode("lin_api_0123456789"));
        assert_eq!(record.linear_api_key(state.key()).unwrap(), "lin_api_0123456789");
        assert_eq!(record.github_api_key(state.key()).unwrap(), "ghp_0123456789");
    }

    #[tokio::test]
    async fn test_incomplete_pair_rejected() {
        let state = state();
        let mut body = payload();
        body["github"]["repoId"] = serde_json::json!("");

        let (status, body, _) = post_save(state.clone(), body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("GitHub"));
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let (status, body, _) = post_save(state(), "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    }

    #[test]
    fn test_wrong_key_fails_validation() {
        let state = state();
        let record = state
            .register(serde_json::from_value(payload()).unwrap())
            .unwrap();
        let other = EncryptionKey::from_bytes(&[4u8; 32]).unwrap();
        assert!(record.linear_api_key(&other).is_err());
    }

    #[test]
    fn test_ids_with_colons_do_not_collide() {
        let state = state();
        for (team, repo) in [("a:b", "c"), ("a", "b:c")] {
            let mut body = payload();
            body["linear"]["teamId"] = serde_json::json!(team);
            body["github"]["repoId"] = serde_json::json!(repo);
            state.register(serde_json::from_value(body).unwrap()).unwrap();
        }

        assert_eq!(state.len(), 2);
        assert_eq!(state.lookup("a:b", "c").unwrap().linear_team_id, "a:b");
        assert_eq!(state.lookup("a", "b:c").unwrap().github_repo_id, "b:c");
    }
}
