//! Per-provider sync contexts
//!
//! A context is created when the user authorizes a provider, filled in as the
//! webhook deploy step reports IDs, and wiped right after a successful save.
//! The team/repo ID is the completeness signal: until both are present there
//! is nothing to sync.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::looks_like_api_key;
use crate::errors::{Result, SyncError};

/// Local storage key for a cached Linear context
pub const LINEAR_STORAGE_KEY: &str = "linear-context";

/// Local storage key for a cached GitHub context
pub const GITHUB_STORAGE_KEY: &str = "github-context";

/// Common surface of the two provider contexts
pub trait ProviderContext {
    const PROVIDER: &'static str;
    const STORAGE_KEY: &'static str;

    fn api_key(&self) -> &str;

    fn user_id(&self) -> &str;

    /// Team ID for Linear, repo ID for GitHub
    fn completeness_signal(&self) -> &str;

    /// Wipe all fields, secret material included
    fn clear(&mut self);

    fn has_credentials(&self) -> bool {
        !self.api_key().is_empty()
    }

    fn is_complete(&self) -> bool {
        !self.completeness_signal().is_empty()
    }

    /// Check field shapes before any field is trusted
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("userId", self.user_id()),
            ("id", self.completeness_signal()),
        ] {
            if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
                return Err(SyncError::InvalidContext(format!(
                    "{} {name} contains whitespace or control characters",
                    Self::PROVIDER
                )));
            }
        }

        if self.has_credentials() && !looks_like_api_key(self.api_key()) {
            return Err(SyncError::InvalidContext(format!(
                "{} apiKey is not a well-formed key",
                Self::PROVIDER
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinearContext {
    pub user_id: String,
    pub team_id: String,
    pub api_key: String,
}

impl LinearContext {
    /// Context right after OAuth, before the webhook is deployed
    pub fn authorized(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

impl ProviderContext for LinearContext {
    const PROVIDER: &'static str = "Linear";
    const STORAGE_KEY: &'static str = LINEAR_STORAGE_KEY;

    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn completeness_signal(&self) -> &str {
        &self.team_id
    }

    fn clear(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for LinearContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearContext")
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubContext {
    pub user_id: String,
    pub repo_id: String,
    pub api_key: String,
}

impl GitHubContext {
    pub fn authorized(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

impl ProviderContext for GitHubContext {
    const PROVIDER: &'static str = "GitHub";
    const STORAGE_KEY: &'static str = GITHUB_STORAGE_KEY;

    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn completeness_signal(&self) -> &str {
        &self.repo_id
    }

    fn clear(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for GitHubContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubContext")
            .field("user_id", &self.user_id)
            .field("repo_id", &self.repo_id)
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Restore a context from locally cached JSON.
///
/// The cache is untrusted: the shape is checked by serde (every field must be
/// a string) and then by [`ProviderContext::validate`].
pub fn restore<C>(cached: &str) -> Result<C>
where
    C: ProviderContext + DeserializeOwned,
{
    let invalid =
        |e: serde_json::Error| SyncError::InvalidContext(format!("cached {} context: {e}", C::PROVIDER));

    let value: serde_json::Value = serde_json::from_str(cached).map_err(invalid)?;
    if !value.is_object() {
        return Err(SyncError::InvalidContext(format!(
            "cached {} context is not an object",
            C::PROVIDER
        )));
    }
    let context: C = serde_json::from_value(value).map_err(invalid)?;
    context.validate()?;
    Ok(context)
}

/// Which sync directions are currently possible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReadiness {
    /// Linear team known and GitHub authorized
    pub linear_to_github: bool,
    /// GitHub repo known and Linear authorized
    pub github_to_linear: bool,
    /// Both completeness signals present; a save may be submitted
    pub complete: bool,
}

impl SyncReadiness {
    pub fn evaluate(linear: &LinearContext, github: &GitHubContext) -> Self {
        Self {
            linear_to_github: linear.is_complete() && github.has_credentials(),
            github_to_linear: github.is_complete() && linear.has_credentials(),
            complete: linear.is_complete() && github.is_complete(),
        }
    }
}
