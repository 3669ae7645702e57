// ABOUTME: In-memory registry store.
// ABOUTME: Lives as long as its manager; the default for tests and embedding.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{DeploymentStore, Registration, StoreError};

pub struct InMemoryStore<H> {
    entries: RwLock<BTreeMap<String, Registration<H>>>,
}

impl<H> InMemoryStore<H> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<H> Default for InMemoryStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> DeploymentStore<H> for InMemoryStore<H>
where
    H: Clone + Send + Sync,
{
    fn get(&self, id: &str) -> Result<Option<Registration<H>>, StoreError> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn set(&self, id: &str, registration: Registration<H>) -> Result<(), StoreError> {
        self.entries.write().insert(id.to_string(), registration);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<Option<Registration<H>>, StoreError> {
        Ok(self.entries.write().remove(id))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
