// ABOUTME: JSON-file registry store so registrations outlive the process.
// ABOUTME: Writes go to a temp file that is renamed over the state file; literal secrets are withheld.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::config::EnvValue;

use super::{DeploymentStore, Registration, StoreError};

/// Default state file location relative to the project directory.
pub const DEFAULT_STATE_FILE: &str = ".deckhand/state.json";

/// Secret values per deployment id, used to refill withheld literals.
pub type SecretSource = BTreeMap<String, BTreeMap<String, EnvValue>>;

/// Registry persisted as one JSON document.
///
/// Literal secret values never reach the file: they are written as
/// [`EnvValue::Withheld`] and refilled on read from the secret source, if
/// one was given. References to the process environment are kept as-is.
pub struct JsonFileStore<H> {
    path: PathBuf,
    secrets: SecretSource,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
    _handle: PhantomData<fn() -> H>,
}

impl<H> JsonFileStore<H> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            secrets: SecretSource::new(),
            guard: Mutex::new(()),
            _handle: PhantomData,
        }
    }

    /// Refill withheld secrets from `secrets` when registrations are read.
    pub fn with_secrets(mut self, secrets: SecretSource) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<H> JsonFileStore<H>
where
    H: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<BTreeMap<String, Registration<H>>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &mut BTreeMap<String, Registration<H>>) -> Result<(), StoreError> {
        for registration in entries.values_mut() {
            withhold_literals(&mut registration.config.secrets);
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&*entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn hydrate(&self, id: &str, mut registration: Registration<H>) -> Registration<H> {
        if let Some(source) = self.secrets.get(id) {
            for (key, value) in registration.config.secrets.iter_mut() {
                if *value == EnvValue::Withheld
                    && let Some(known) = source.get(key)
                {
                    *value = known.clone();
                }
            }
        }
        registration
    }
}

fn withhold_literals(secrets: &mut BTreeMap<String, EnvValue>) {
    for value in secrets.values_mut() {
        if value.is_literal() {
            *value = EnvValue::Withheld;
        }
    }
}

impl<H> DeploymentStore<H> for JsonFileStore<H>
where
    H: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn get(&self, id: &str) -> Result<Option<Registration<H>>, StoreError> {
        let _guard = self.guard.lock();
        Ok(self.load()?.remove(id).map(|r| self.hydrate(id, r)))
    }

    fn set(&self, id: &str, registration: Registration<H>) -> Result<(), StoreError> {
        let _guard = self.guard.lock();
        let mut entries = self.load()?;
        entries.insert(id.to_string(), registration);
        self.save(&mut entries)
    }

    fn delete(&self, id: &str) -> Result<Option<Registration<H>>, StoreError> {
        let _guard = self.guard.lock();
        let mut entries = self.load()?;
        let removed = entries.remove(id);
        if removed.is_some() {
            self.save(&mut entries)?;
        }
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.guard.lock();
        Ok(self.load()?.into_keys().collect())
    }
}
