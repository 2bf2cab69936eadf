//! Sync orchestrator - submit both provider contexts to the save endpoint
//!
//! One `save` is exactly one `POST /api/save`. There is no retry: a transport
//! failure or an explicit `error` in the response goes straight back to the
//! caller, who decides whether to re-trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::context::{GitHubContext, LinearContext, ProviderContext};
use crate::errors::{Result, SyncError};

/// Body of `POST /api/save`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavePayload {
    pub github: GitHubContext,
    pub linear: LinearContext,
}

/// Response of `POST /api/save`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a successful save established
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub linear_team_id: String,
    pub github_repo_id: String,
    pub saved_at: DateTime<Utc>,
}

/// Submits sync pairs to the persistence endpoint.
///
/// Not re-entrant: while one `save` is pending, further calls fail with
/// [`SyncError::SubmissionInFlight`] rather than creating duplicates.
pub struct SyncOrchestrator {
    client: reqwest::Client,
    save_url: String,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the submission resolves or is dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncOrchestrator {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            save_url: config.save_url(),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn save_url(&self) -> &str {
        &self.save_url
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit both contexts. Secrets in the passed contexts are wiped once the
    /// request body has been built.
    pub async fn save(&self, linear: LinearContext, github: GitHubContext) -> Result<SaveReceipt> {
        if !linear.has_credentials() {
            return Err(SyncError::MissingCredentials(LinearContext::PROVIDER));
        }
        if !github.has_credentials() {
            return Err(SyncError::MissingCredentials(GitHubContext::PROVIDER));
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected save: previous submission still in flight");
            return Err(SyncError::SubmissionInFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        let linear_team_id = linear.team_id.clone();
        let github_repo_id = github.repo_id.clone();

        let mut payload = SavePayload { github, linear };
        let request = self.client.post(&self.save_url).json(&payload).build();
        payload.linear.clear();
        payload.github.clear();
        let request = request?;

        debug!(
            url = %self.save_url,
            team_id = %linear_team_id,
            repo_id = %github_repo_id,
            "Submitting sync"
        );

        let response = self.client.execute(request).await.map_err(|e| {
            warn!("Sync submission failed: {}", e);
            SyncError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        // Only a JSON object is an answer; arrays and scalars are not
        let reply = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| match value {
                serde_json::Value::Object(fields) => Some(fields),
                _ => None,
            });

        let Some(reply) = reply else {
            warn!(status = %status, "Save endpoint returned a non-object body");
            return Err(SyncError::Transport(format!(
                "save endpoint returned {status} with a non-object body ({} bytes)",
                body.len()
            )));
        };

        match reply.get("error") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(error)) => {
                warn!(status = %status, "Save endpoint rejected sync: {}", error);
                return Err(SyncError::RemoteRejection(error.clone()));
            }
            Some(_) => {
                return Err(SyncError::Transport(
                    "save endpoint returned a non-string error field".to_string(),
                ));
            }
        }

        if !status.is_success() {
            warn!(status = %status, "Save endpoint returned error status");
            return Err(SyncError::Transport(format!(
                "save endpoint returned {status}"
            )));
        }

        info!(
            team_id = %linear_team_id,
            repo_id = %github_repo_id,
            "Sync saved"
        );

        Ok(SaveReceipt {
            linear_team_id,
            github_repo_id,
            saved_at: Utc::now(),
        })
    }
}
