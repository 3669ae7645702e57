// ABOUTME: Polling rollout confirmation with a hard deadline.
// ABOUTME: Reads workload state until ready, explicitly failed, or timed out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::deploy::DeployError;
use crate::model::ConditionStatus;

use super::client::ClusterClient;
use super::types::WorkloadState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Whether the workload has converged on `desired` replicas.
///
/// The reported spec and the live replica set must both match `desired`;
/// a status that still describes the previous spec is not complete.
pub fn rollout_complete(state: &WorkloadState, desired: u32) -> bool {
    if state.desired_replicas != desired || state.replicas != desired {
        return false;
    }
    desired == 0 || state.ready_replicas == state.replicas
}

/// Message of a `Progressing=False` condition, if the control plane gave up.
pub fn rollout_stalled(state: &WorkloadState) -> Option<String> {
    let progressing = state.condition("Progressing")?;
    (progressing.status == ConditionStatus::False).then(|| {
        progressing
            .message
            .clone()
            .or_else(|| progressing.reason.clone())
            .unwrap_or_else(|| "workload stopped progressing".to_string())
    })
}

/// Poll until the rollout completes.
///
/// Never sleeps past the deadline. Dropping the future cancels the wait;
/// whatever was already applied to the cluster stays applied.
pub async fn wait_for_rollout(
    client: &dyn ClusterClient,
    namespace: &str,
    workload: &str,
    desired: u32,
    config: &RolloutConfig,
) -> Result<WorkloadState, DeployError> {
    let started = Instant::now();
    let deadline = started + config.timeout;

    loop {
        let state = client.read_workload(namespace, workload).await?;

        if rollout_complete(&state, desired) {
            tracing::debug!(
                workload,
                ready = state.ready_replicas,
                elapsed = ?started.elapsed(),
                "rollout complete"
            );
            return Ok(state);
        }

        if let Some(message) = rollout_stalled(&state) {
            return Err(DeployError::RolloutFailed(message));
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DeployError::RolloutTimeout {
                elapsed: started.elapsed(),
            });
        }

        tracing::trace!(
            workload,
            ready = state.ready_replicas,
            replicas = state.replicas,
            "waiting for rollout"
        );
        tokio::time::sleep(config.poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::WorkloadCondition;

    fn state(replicas: u32, ready: u32) -> WorkloadState {
        WorkloadState {
            desired_replicas: replicas,
            replicas,
            ready_replicas: ready,
            ..Default::default()
        }
    }

    #[test]
    fn complete_requires_all_ready_and_nonzero() {
        assert!(rollout_complete(&state(3, 3), 3));
        assert!(!rollout_complete(&state(3, 2), 3));
        assert!(!rollout_complete(&state(0, 0), 3));
    }

    #[test]
    fn stale_status_for_another_count_is_not_complete() {
        assert!(!rollout_complete(&state(1, 1), 3));
        assert!(!rollout_complete(&state(3, 3), 1));

        let mut surging = state(3, 3);
        surging.desired_replicas = 2;
        assert!(!rollout_complete(&surging, 2));
    }

    #[test]
    fn scale_to_zero_completes_when_no_replicas_remain() {
        assert!(rollout_complete(&state(0, 0), 0));
        assert!(!rollout_complete(&state(1, 1), 0));
    }

    #[test]
    fn progressing_false_reports_its_message() {
        let mut s = state(2, 0);
        s.conditions.push(WorkloadCondition {
            condition_type: "Progressing".into(),
            status: ConditionStatus::False,
            reason: Some("ProgressDeadlineExceeded".into()),
            message: Some("replica set has timed out progressing".into()),
        });
        assert_eq!(
            rollout_stalled(&s).as_deref(),
            Some("replica set has timed out progressing")
        );
    }

    #[test]
    fn progressing_true_is_not_stalled() {
        let mut s = state(2, 0);
        s.conditions.push(WorkloadCondition {
            condition_type: "Progressing".into(),
            status: ConditionStatus::True,
            reason: None,
            message: None,
        });
        assert!(rollout_stalled(&s).is_none());
    }
}
