// ABOUTME: Error taxonomy for deployment operations.
// ABOUTME: Every failure maps to a DeployErrorKind carried on DeploymentResult.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::cluster::{ChartError, ClusterError};
use crate::runtime::{ContainerError, ImageError, LogError, StatsError};
use crate::store::StoreError;

/// Errors raised by backend managers and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The deployment config is malformed. Detected before any platform call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The external platform call itself failed.
    #[error("platform error: {0}")]
    Platform(String),

    /// Rollout did not converge before its timeout.
    #[error("rollout timed out after {elapsed:?}")]
    RolloutTimeout { elapsed: Duration },

    /// The platform reported that the rollout stopped progressing.
    #[error("rollout failed: {0}")]
    RolloutFailed(String),

    /// The operation has no meaning on this backend.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No deployment is registered under this id.
    #[error("deployment not found: {0}")]
    NotFound(String),

    /// No backend is configured for the requested platform.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A deployment with this id is already registered.
    #[error("deployment already exists: {0} (use update instead)")]
    AlreadyDeployed(String),

    /// The registry store could not be read or written.
    #[error("registry store error: {0}")]
    Store(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployErrorKind {
    Validation,
    Platform,
    RolloutTimeout,
    RolloutFailed,
    UnsupportedOperation,
    NotFound,
    UnsupportedPlatform,
    AlreadyDeployed,
    Store,
}

impl DeployError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Validation(_) => DeployErrorKind::Validation,
            DeployError::Platform(_) => DeployErrorKind::Platform,
            DeployError::RolloutTimeout { .. } => DeployErrorKind::RolloutTimeout,
            DeployError::RolloutFailed(_) => DeployErrorKind::RolloutFailed,
            DeployError::UnsupportedOperation(_) => DeployErrorKind::UnsupportedOperation,
            DeployError::NotFound(_) => DeployErrorKind::NotFound,
            DeployError::UnsupportedPlatform(_) => DeployErrorKind::UnsupportedPlatform,
            DeployError::AlreadyDeployed(_) => DeployErrorKind::AlreadyDeployed,
            DeployError::Store(_) => DeployErrorKind::Store,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeployError::Platform(_) | DeployError::RolloutTimeout { .. } | DeployError::Store(_)
        )
    }
}

impl fmt::Display for DeployErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployErrorKind::Validation => "ValidationError",
            DeployErrorKind::Platform => "PlatformError",
            DeployErrorKind::RolloutTimeout => "RolloutTimeoutError",
            DeployErrorKind::RolloutFailed => "RolloutFailedError",
            DeployErrorKind::UnsupportedOperation => "UnsupportedOperationError",
            DeployErrorKind::NotFound => "NotFoundError",
            DeployErrorKind::UnsupportedPlatform => "UnsupportedPlatformError",
            DeployErrorKind::AlreadyDeployed => "AlreadyDeployedError",
            DeployErrorKind::Store => "StoreError",
        };
        f.write_str(name)
    }
}

impl From<ImageError> for DeployError {
    fn from(err: ImageError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<ContainerError> for DeployError {
    fn from(err: ContainerError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<LogError> for DeployError {
    fn from(err: LogError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<StatsError> for DeployError {
    fn from(err: StatsError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<ClusterError> for DeployError {
    fn from(err: ClusterError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<ChartError> for DeployError {
    fn from(err: ChartError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

impl From<StoreError> for DeployError {
    fn from(err: StoreError) -> Self {
        DeployError::Store(err.to_string())
    }
}
