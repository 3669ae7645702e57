// ABOUTME: Application-wide error types for deckhand's manifest and CLI layers.
// ABOUTME: Uses thiserror; deployment and runtime errors convert in via From.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("manifest not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("value was withheld from saved state; redeploy from the manifest to supply it")]
    WithheldValue,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no deployment with id {0} in the manifest")]
    UnknownDeployment(String),

    #[error("{0}")]
    OperationFailed(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
