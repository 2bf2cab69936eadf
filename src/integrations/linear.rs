//! Linear attachment mutations
//!
//! After a GitHub issue is mirrored into Linear, the Linear issue gets an
//! attachment pointing back at the GitHub issue. The textual mutation is built
//! by [`build_attachment_mutation`]; [`LinearClient::create_attachment`] sends
//! the same input as GraphQL variables, and only for events the loop guard
//! let through.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{Result, SyncError};
use crate::guard::GuardDecision;

/// Linear GraphQL endpoint
pub const LINEAR_GRAPHQL_ENDPOINT: &str = "https://api.linear.app/graphql";

/// Linear web app
pub const LINEAR_APP_URL: &str = "https://linear.app";

/// Icon shown on the back-link attachment
pub const GITHUB_ICON_URL: &str = "https://cdn.iconscout.com/icon/free/png-256/github-153-675523.png";

pub const ATTACHMENT_SUBTITLE: &str = "Synchronized";

const ATTACHMENT_CREATE_MUTATION: &str = r#"
mutation($input: AttachmentCreateInput!) {
    attachmentCreate(input: $input) {
        success
    }
}"#;

/// Input linking a Linear issue to its GitHub counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMutation {
    pub issue_id: String,
    pub issue_number: u64,
    /// `owner/name`
    pub repo_full_name: String,
}

/// `attachmentCreate` input object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentCreateInput {
    pub issue_id: String,
    pub title: String,
    pub subtitle: String,
    pub url: String,
    pub icon_url: String,
}

impl AttachmentMutation {
    pub fn new(
        issue_id: impl Into<String>,
        issue_number: u64,
        repo_full_name: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            issue_number,
            repo_full_name: repo_full_name.into(),
        }
    }

    pub fn title(&self) -> String {
        format!("GitHub Issue #{}", self.issue_number)
    }

    pub fn issue_url(&self) -> String {
        format!(
            "https://github.com/{}/issues/{}",
            self.repo_full_name, self.issue_number
        )
    }

    pub fn input(&self) -> AttachmentCreateInput {
        AttachmentCreateInput {
            issue_id: self.issue_id.clone(),
            title: self.title(),
            subtitle: ATTACHMENT_SUBTITLE.to_string(),
            url: self.issue_url(),
            icon_url: GITHUB_ICON_URL.to_string(),
        }
    }

    /// Inline mutation text, values interpolated as-is
    pub fn to_query(&self) -> String {
        format!(
            r#"mutation {{
        attachmentCreate(input: {{
            issueId: "{issue_id}"
            title: "{title}"
            subtitle: "{subtitle}"
            url: "{url}"
            iconUrl: "{icon_url}"
        }}) {{
            success
        }}
    }}"#,
            issue_id = self.issue_id,
            title = self.title(),
            subtitle = ATTACHMENT_SUBTITLE,
            url = self.issue_url(),
            icon_url = GITHUB_ICON_URL,
        )
    }

    /// GraphQL request body with the input passed as variables
    pub fn to_request(&self) -> serde_json::Value {
        serde_json::json!({
            "query": ATTACHMENT_CREATE_MUTATION,
            "variables": { "input": self.input() },
        })
    }
}

/// Build the inline `attachmentCreate` mutation.
///
/// `issue_id` and `repo_full_name` are interpolated without escaping and must
/// be trusted internal identifiers.
pub fn build_attachment_mutation(issue_id: &str, issue_number: u64, repo_full_name: &str) -> String {
    AttachmentMutation::new(issue_id, issue_number, repo_full_name).to_query()
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentCreateData {
    attachment_create: AttachmentCreatePayload,
}

#[derive(Debug, Deserialize)]
struct AttachmentCreatePayload {
    success: bool,
}

/// Minimal Linear GraphQL client, authenticated with a user's API key
pub struct LinearClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl LinearClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoint(api_key, LINEAR_GRAPHQL_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Create the back-link attachment for an event the loop guard passed.
    ///
    /// Returns `None` without any request when `decision` is a skip, otherwise
    /// Linear's `success` flag. No retry: a failure is returned as-is.
    pub async fn create_attachment(
        &self,
        decision: &GuardDecision,
        mutation: &AttachmentMutation,
    ) -> Result<Option<bool>> {
        if let GuardDecision::Skip(reason) = decision {
            debug!(issue_id = %mutation.issue_id, "Not creating attachment: {}", reason);
            return Ok(None);
        }
        self.send_attachment(mutation).await.map(Some)
    }

    async fn send_attachment(&self, mutation: &AttachmentMutation) -> Result<bool> {
        debug!(
            issue_id = %mutation.issue_id,
            issue_number = mutation.issue_number,
            repo = %mutation.repo_full_name,
            "Creating Linear attachment"
        );

        // Linear personal keys go in the Authorization header without a scheme
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &self.api_key)
            .json(&mutation.to_request())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Linear returned {} for attachmentCreate", status);
            return Err(SyncError::RemoteRejection(format!(
                "Linear API error ({status}): {body}"
            )));
        }

        let payload: GraphQLResponse<AttachmentCreateData> = response.json().await?;

        if let Some(errors) = payload.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::RemoteRejection(messages.join(", ")));
        }

        let success = payload
            .data
            .map(|d| d.attachment_create.success)
            .ok_or_else(|| SyncError::RemoteRejection("No data in GraphQL response".to_string()))?;

        if success {
            info!("Linked {} to {}", mutation.issue_id, mutation.issue_url());
        } else {
            warn!("Linear reported success=false for attachmentCreate");
        }

        Ok(success)
    }
}
