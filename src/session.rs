//! Client-side sync session
//!
//! Holds the two contexts while the user authorizes each provider, caches them
//! so a reload does not lose progress, and triggers exactly one save once both
//! completeness signals are present. After a successful save every cached
//! secret is wiped; after a failure nothing is marked synced.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::context::{restore, GitHubContext, LinearContext, ProviderContext, SyncReadiness};
use crate::errors::Result;
use crate::orchestrator::{SaveReceipt, SyncOrchestrator};

/// Key/value storage the session caches contexts in (browser local storage,
/// a file, memory)
pub trait ContextStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String);

    /// Remove every entry
    fn clear(&mut self);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContextStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct SyncSession<S: ContextStore> {
    linear: LinearContext,
    github: GitHubContext,
    store: S,
    synced: bool,
    restored: bool,
}

impl<S: ContextStore> SyncSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            linear: LinearContext::default(),
            github: GitHubContext::default(),
            store,
            synced: false,
            restored: false,
        }
    }

    /// Start a session from whatever the store has cached.
    ///
    /// Cached entries that fail validation are ignored.
    pub fn restore(store: S) -> Self {
        let mut session = Self::new(store);

        if let Some(linear) = session.restore_cached::<LinearContext>() {
            session.linear = linear;
            session.restored = true;
        }
        if let Some(github) = session.restore_cached::<GitHubContext>() {
            session.github = github;
            session.restored = true;
        }

        session
    }

    fn restore_cached<C>(&self) -> Option<C>
    where
        C: ProviderContext + serde::de::DeserializeOwned,
    {
        let cached = self.store.get(C::STORAGE_KEY)?;
        match restore::<C>(&cached) {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("Ignoring cached {} context: {}", C::PROVIDER, e);
                None
            }
        }
    }

    pub fn linear(&self) -> &LinearContext {
        &self.linear
    }

    pub fn github(&self) -> &GitHubContext {
        &self.github
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn readiness(&self) -> SyncReadiness {
        SyncReadiness::evaluate(&self.linear, &self.github)
    }

    pub fn set_linear(&mut self, context: LinearContext) {
        self.linear = context;
        self.persist();
    }

    pub fn set_github(&mut self, context: GitHubContext) {
        self.github = context;
        self.persist();
    }

    /// Cache every context that already holds an API key
    fn persist(&mut self) {
        if self.linear.has_credentials() {
            if let Ok(json) = serde_json::to_string(&self.linear) {
                self.store.set(LinearContext::STORAGE_KEY, json);
            }
        }
        if self.github.has_credentials() {
            if let Ok(json) = serde_json::to_string(&self.github) {
                self.store.set(GitHubContext::STORAGE_KEY, json);
            }
        }
    }

    /// Submit the pair if both completeness signals are present.
    ///
    /// Returns `Ok(None)` without any network call when the pair is not yet
    /// complete. On success the contexts and the store are wiped.
    pub async fn sync(&mut self, orchestrator: &SyncOrchestrator) -> Result<Option<SaveReceipt>> {
        if !self.readiness().complete {
            debug!("Sync pair incomplete, not submitting");
            return Ok(None);
        }

        match orchestrator
            .save(self.linear.clone(), self.github.clone())
            .await
        {
            Ok(receipt) => {
                self.synced = true;
                self.linear.clear();
                self.github.clear();
                self.store.clear();
                info!("Synced; local credentials cleared");
                Ok(Some(receipt))
            }
            Err(e) => {
                self.synced = false;
                Err(e)
            }
        }
    }
}
