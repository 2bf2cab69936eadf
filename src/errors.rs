//! Error taxonomy for the sync core
//!
//! Every failure path returns a typed [`SyncError`] that an outer layer
//! (CLI, save endpoint, UI collaborator) displays. Nothing is swallowed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or mis-sized encryption key. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed ciphertext or IV input.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The network submission itself failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side answered with an explicit error field. Shown verbatim.
    #[error("{0}")]
    RemoteRejection(String),

    /// A context failed schema validation.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("missing API key for {0}")]
    MissingCredentials(&'static str),

    /// A previous `save` has not resolved yet.
    #[error("a sync submission is already in flight")]
    SubmissionInFlight,
}

impl SyncError {
    /// Message suitable for showing to the end user
    pub fn user_message(&self) -> String {
        match self {
            SyncError::RemoteRejection(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
