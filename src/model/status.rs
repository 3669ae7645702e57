// ABOUTME: Canonical cross-backend deployment status.
// ABOUTME: Backends convert native status into this shape through pure functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coarse lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCounts {
    pub desired: u32,
    pub current: u32,
    pub ready: u32,
    pub available: u32,
    pub unavailable: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(condition_type: &str, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status,
            reason: None,
            message: None,
            last_transition_time: None,
            last_update_time: None,
        }
    }

    pub fn with_reason(mut self, reason: &str, message: impl Into<String>) -> Self {
        self.reason = Some(reason.to_string());
        self.message = Some(message.into());
        self
    }
}

/// Snapshot of a deployment as seen by its backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub phase: Phase,
    pub replicas: ReplicaCounts,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub ready_replicas: u32,
    pub available_replicas: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DeploymentStatus {
    /// Status built from replica counts, stamped now.
    pub fn from_replicas(phase: Phase, replicas: ReplicaCounts) -> Self {
        Self {
            phase,
            replicas,
            conditions: Vec::new(),
            ready_replicas: replicas.ready,
            available_replicas: replicas.available,
            last_updated: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Status for a deployment the backend cannot describe.
    pub fn unknown(reason: impl Into<String>) -> Self {
        let mut status = Self::from_replicas(Phase::Unknown, ReplicaCounts::default());
        status.conditions.push(
            Condition::new("Available", ConditionStatus::Unknown).with_reason("Unknown", reason),
        );
        status
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}
