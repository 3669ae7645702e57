// ABOUTME: Deployment registry: id -> last-known config, backend handle and image history.
// ABOUTME: Injected into managers so tests and the CLI can choose memory or file storage.

mod file;
mod memory;

pub use file::{DEFAULT_STATE_FILE, JsonFileStore, SecretSource};
pub use memory::InMemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::DeploymentConfig;

/// Number of prior images remembered per deployment.
pub const HISTORY_LIMIT: usize = 10;

/// What a manager knows about one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration<H> {
    pub config: DeploymentConfig,
    /// Backend handle; `None` while scaled to zero.
    pub handle: Option<H>,
    pub replicas: u32,
    /// Prior image references, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl<H> Registration<H> {
    pub fn new(config: DeploymentConfig, handle: Option<H>, replicas: u32) -> Self {
        Self {
            config,
            handle,
            replicas,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Remember `image` as the most recent prior image.
    pub fn push_history(&mut self, image: &str) {
        if self.history.last().map(String::as_str) == Some(image) {
            return;
        }
        self.history.push(image.to_string());
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn previous_image(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed storage for registrations.
pub trait DeploymentStore<H>: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Registration<H>>, StoreError>;

    fn set(&self, id: &str, registration: Registration<H>) -> Result<(), StoreError>;

    /// Remove and return the registration.
    fn delete(&self, id: &str) -> Result<Option<Registration<H>>, StoreError>;

    /// All registered ids, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
