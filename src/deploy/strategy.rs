// ABOUTME: Deployment strategies and how the container engine realizes them.
// ABOUTME: Single-container backends degrade rolling updates to replacement.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::DeploymentConfig;

/// Strategy for rolling out a new version of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    /// Replace replicas incrementally (cluster backends).
    #[default]
    #[serde(alias = "rolling-update", alias = "rolling_update")]
    RollingUpdate,

    /// Stop the running workload before starting the new one.
    #[serde(alias = "recreate")]
    Recreate,

    /// Stand up a full replacement alongside, switch only once it is healthy.
    #[serde(alias = "blue-green", alias = "blue_green")]
    BlueGreen,
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStrategy::RollingUpdate => write!(f, "RollingUpdate"),
            DeploymentStrategy::Recreate => write!(f, "Recreate"),
            DeploymentStrategy::BlueGreen => write!(f, "BlueGreen"),
        }
    }
}

/// How a single-container engine carries out an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerUpdatePlan {
    /// Stop the old container, start the new one, remove the old one once the
    /// new one is confirmed. There is no rolling update without a cluster
    /// layer, so RollingUpdate lands here too.
    Replace,

    /// Run a second container next to the first and switch over (blue-green).
    SideBySide,
}

impl ContainerUpdatePlan {
    /// Determine the plan for a strategy on the container engine.
    /// Returns the plan and a reason if it differs from what was requested.
    pub fn for_strategy(
        strategy: DeploymentStrategy,
        config: &DeploymentConfig,
    ) -> (Self, Option<&'static str>) {
        match strategy {
            DeploymentStrategy::Recreate => (ContainerUpdatePlan::Replace, None),
            DeploymentStrategy::RollingUpdate => (
                ContainerUpdatePlan::Replace,
                Some("rolling update requires a cluster; replacing the container instead"),
            ),
            DeploymentStrategy::BlueGreen if config.has_host_port_bindings() => (
                ContainerUpdatePlan::Replace,
                Some("host port bindings prevent running blue and green side by side"),
            ),
            DeploymentStrategy::BlueGreen => (ContainerUpdatePlan::SideBySide, None),
        }
    }
}
