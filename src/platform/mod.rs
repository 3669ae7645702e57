// ABOUTME: The contract every backend manager implements, and the closed set of platforms.
// ABOUTME: Mutating operations report failure in their result; logs and delete propagate errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::deploy::DeployError;
use crate::model::{DeploymentConfig, DeploymentResult, DeploymentStatus, DeploymentUpdate};

/// Options for fetching deployment logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Only the last N lines.
    pub tail: Option<u32>,
    /// Only lines newer than this Unix timestamp.
    pub since: Option<i64>,
    /// Prefix each line with its timestamp.
    pub timestamps: bool,
}

impl LogQuery {
    pub fn tail(lines: u32) -> Self {
        Self {
            tail: Some(lines),
            ..Default::default()
        }
    }
}

/// Lifecycle operations exposed by a backend manager.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Create the workload and register it.
    async fn deploy(&self, config: DeploymentConfig) -> DeploymentResult;

    /// Apply an update to a registered deployment.
    async fn update(&self, id: &str, update: DeploymentUpdate) -> DeploymentResult;

    /// Return to `version`, or to the previous image when `None`.
    async fn rollback(&self, id: &str, version: Option<&str>) -> DeploymentResult;

    async fn scale(&self, id: &str, replicas: u32) -> DeploymentResult;

    /// Current status. Unregistered ids report the `Unknown` phase.
    async fn get_status(&self, id: &str) -> DeploymentStatus;

    async fn get_logs(&self, id: &str, query: &LogQuery) -> Result<Vec<String>, DeployError>;

    /// Remove the workload and its registration. Deleting an unregistered id
    /// succeeds without side effects.
    async fn delete(&self, id: &str) -> Result<(), DeployError>;
}

/// Backend families a deployment can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Single-container engine (Docker, Podman).
    #[serde(alias = "podman")]
    Docker,
    /// Cluster orchestrator.
    #[serde(alias = "k8s")]
    Kubernetes,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Docker => write!(f, "docker"),
            Platform::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

impl FromStr for Platform {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "podman" => Ok(Platform::Docker),
            "kubernetes" | "k8s" => Ok(Platform::Kubernetes),
            other => Err(DeployError::UnsupportedPlatform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployErrorKind;

    #[test]
    fn parses_platform_aliases() {
        assert_eq!("Docker".parse::<Platform>().unwrap(), Platform::Docker);
        assert_eq!("k8s".parse::<Platform>().unwrap(), Platform::Kubernetes);
    }

    #[test]
    fn unknown_platform_is_unsupported() {
        let err = "nomad".parse::<Platform>().unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::UnsupportedPlatform);
        assert!(err.to_string().contains("nomad"));
    }
}
