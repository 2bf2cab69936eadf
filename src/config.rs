//! Runtime configuration
//!
//! Environment:
//!   ENCRYPTION_KEY     - 32-byte key (32 raw chars or 64 hex chars)
//!   SYNC_API_URL       - Base URL of the save endpoint (default: http://127.0.0.1:3000)
//!   SYNC_TIMEOUT_SECS  - HTTP timeout for submissions (default: 10)
//!   SYNC_PORT          - Port for `synclinear serve` (default: 3000)

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_PORT: u16 = 3000;

/// Path of the persistence endpoint, relative to the API base URL
pub const SAVE_PATH: &str = "/api/save";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL the orchestrator submits to
    pub api_url: String,

    /// Timeout for one submission
    pub timeout_secs: u64,

    /// Port the save endpoint listens on
    pub port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            port: DEFAULT_PORT,
        }
    }
}

impl SyncConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("SYNC_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout_secs: std::env::var("SYNC_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            port: std::env::var("SYNC_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
        }
    }

    /// Full URL of the save endpoint
    pub fn save_url(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), SAVE_PATH)
    }
}

/// Webhook URL to register with the providers for a deployment origin.
///
/// Providers refuse localhost targets, so local development registers a
/// placeholder instead.
pub fn webhook_url(origin: &str) -> String {
    let host = origin
        .split("://")
        .nth(1)
        .unwrap_or(origin)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    if host == "localhost" {
        return "https://example.com".to_string();
    }

    format!("{}/api", origin.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_url() {
        let config = SyncConfig {
            api_url: "https://synclinear.com/".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(config.save_url(), "https://synclinear.com/api/save");
        assert_eq!(
            SyncConfig::default().save_url(),
            "http://127.0.0.1:3000/api/save"
        );
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(webhook_url("http://localhost:3000"), "https://example.com");
        assert_eq!(
            webhook_url("https://synclinear.com"),
            "https://synclinear.com/api"
        );
        assert_eq!(
            webhook_url("https://sync.acme.dev/"),
            "https://sync.acme.dev/api"
        );
    }
}
