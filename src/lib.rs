//! SyncLinear core
//!
//! Mirrors Linear tickets and GitHub issues in both directions. This crate
//! holds the parts with real contracts:
//!
//! - [`crypto`]: AES-256-CTR encryption of provider API keys at rest
//! - [`guard`]: loop prevention for inbound webhook events
//! - [`integrations::linear`]: the `attachmentCreate` back-link mutation
//! - [`orchestrator`] and [`session`]: submitting a complete pair to the save endpoint
//! - [`server`]: the save endpoint itself

pub mod config;
pub mod context;
pub mod crypto;
pub mod errors;
pub mod guard;
pub mod integrations;
pub mod middleware;
pub mod orchestrator;
pub mod server;
pub mod session;

pub use config::SyncConfig;
pub use context::{GitHubContext, LinearContext, ProviderContext, SyncReadiness};
pub use crypto::{decrypt, encrypt, EncryptedSecret, EncryptionKey};
pub use errors::{Result, SyncError};
pub use guard::{GuardDecision, LoopGuard, SyncEvent, SyncEventKind};
pub use integrations::{build_attachment_mutation, AttachmentMutation, LinearClient};
pub use orchestrator::{SavePayload, SaveReceipt, SyncOrchestrator};
pub use session::{ContextStore, MemoryStore, SyncSession};

/// Pretty-print JSON with 4-space indentation
pub fn format_json<T: serde::Serialize>(value: &T) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_json_uses_four_spaces() {
        let rendered = format_json(&serde_json::json!({ "error": "rate limited" }));
        assert_eq!(rendered, "{\n    \"error\": \"rate limited\"\n}");
    }
}
