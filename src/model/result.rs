// ABOUTME: Outcome of a single mutating deployment operation.
// ABOUTME: Failures are captured here instead of being returned as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::status::DeploymentStatus;
use crate::deploy::{DeployError, DeployErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStrategy {
    /// Old workload replaced in one step (container engine).
    Immediate,
    /// Rolled back through the rolling update machinery (cluster).
    Gradual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub previous_version: String,
    pub rollback_reason: String,
    pub rollback_timestamp: DateTime<Utc>,
    pub rollback_strategy: RollbackStrategy,
}

impl RollbackInfo {
    pub fn new(previous_version: &str, reason: &str, strategy: RollbackStrategy) -> Self {
        Self {
            previous_version: previous_version.to_string(),
            rollback_reason: reason.to_string(),
            rollback_timestamp: Utc::now(),
            rollback_strategy: strategy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_info: Option<RollbackInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<DeployErrorKind>,
}

impl DeploymentResult {
    pub fn succeeded(id: &str, status: DeploymentStatus, message: impl Into<String>) -> Self {
        Self {
            success: true,
            deployment_id: id.to_string(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            rollback_info: None,
            metadata: BTreeMap::new(),
            error_kind: None,
        }
    }

    /// Failed result carrying the error's message and kind.
    pub fn failed(id: &str, status: DeploymentStatus, error: &DeployError) -> Self {
        Self {
            success: false,
            deployment_id: id.to_string(),
            status,
            message: error.to_string(),
            timestamp: Utc::now(),
            rollback_info: None,
            metadata: BTreeMap::new(),
            error_kind: Some(error.kind()),
        }
    }

    pub fn with_rollback(mut self, info: RollbackInfo) -> Self {
        self.rollback_info = Some(info);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_carries_kind_and_message() {
        let err = DeployError::NotFound("app-1".into());
        let result = DeploymentResult::failed("app-1", DeploymentStatus::unknown("gone"), &err);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::NotFound));
        assert_eq!(result.message, "deployment not found: app-1");
    }

    #[test]
    fn rollback_strategy_serializes_lowercase() {
        let json = serde_json::to_string(&RollbackStrategy::Gradual).unwrap();
        assert_eq!(json, r#""gradual""#);
    }
}
