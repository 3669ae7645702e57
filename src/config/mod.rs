// ABOUTME: Manifest types and parsing for deckhand.yml.
// ABOUTME: Handles YAML parsing, discovery, and per-environment override merging.

mod deserialize;
mod env_value;
mod init;

pub use env_value::EnvValue;
pub use init::init_manifest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::cluster::RolloutConfig;
use crate::engine::EngineSettings;
use crate::error::{Error, Result};
use crate::model::{DeploymentConfig, DeploymentUpdate};
use crate::orchestrator::OrchestrationConfig;
use crate::platform::Platform;
use crate::runtime::RuntimeConfig;
use crate::store::DEFAULT_STATE_FILE;

pub const MANIFEST_FILENAME: &str = "deckhand.yml";
pub const MANIFEST_FILENAME_ALT: &str = "deckhand.yaml";
pub const MANIFEST_FILENAME_DIR: &str = ".deckhand/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Local container runtime selection.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub rollout: RolloutConfig,

    #[serde(default)]
    pub engine: EngineSettings,

    /// Registry file, relative to the manifest directory.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    #[serde(deserialize_with = "deserialize::deserialize_deployments")]
    pub deployments: NonEmpty<DeploymentConfig>,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentOverride>,
}

/// Overrides applied on top of the base manifest for one environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentOverride {
    #[serde(default)]
    pub platform: Option<Platform>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Per-deployment changes keyed by deployment id.
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentUpdate>,
}

impl Manifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Find the manifest in `dir`, returning it with the path it came from.
    pub fn discover(dir: &Path) -> Result<(Self, PathBuf)> {
        let candidates = [
            dir.join(MANIFEST_FILENAME),
            dir.join(MANIFEST_FILENAME_ALT),
            dir.join(MANIFEST_FILENAME_DIR),
        ];

        for path in candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading manifest");
                return Ok((Self::load(&path)?, path));
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn platform(&self) -> Platform {
        self.orchestration.platform
    }

    /// Registry location resolved against `base`.
    pub fn state_path(&self, base: &Path) -> PathBuf {
        let relative = self
            .state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
        base.join(relative)
    }

    pub fn deployment(&self, id: &str) -> Result<&DeploymentConfig> {
        self.deployments
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::UnknownDeployment(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.deployments.iter().map(|d| d.id.clone()).collect()
    }

    /// Manifest with an environment's overrides merged in.
    pub fn for_environment(&self, name: &str) -> Result<Manifest> {
        let overrides = self
            .environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))?;

        for id in overrides.deployments.keys() {
            if !self.deployments.iter().any(|d| &d.id == id) {
                return Err(Error::InvalidConfig(format!(
                    "environment {name} overrides unknown deployment {id}"
                )));
            }
        }

        let mut merged = self.clone();
        if let Some(platform) = overrides.platform {
            merged.orchestration.platform = platform;
        }

        for deployment in merged.deployments.iter_mut() {
            let mut next = match overrides.deployments.get(&deployment.id) {
                Some(update) => deployment.merged(update),
                None => deployment.clone(),
            };
            next.environment = Some(name.to_string());
            if let Some(namespace) = &overrides.namespace {
                next.namespace = Some(namespace.clone());
            }
            for (k, v) in &overrides.env {
                next.env.insert(k.clone(), v.clone());
            }
            for (k, v) in &overrides.labels {
                next.labels.insert(k.clone(), v.clone());
            }
            *deployment = next;
        }

        Ok(merged)
    }
}
