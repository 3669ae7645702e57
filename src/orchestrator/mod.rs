// ABOUTME: Orchestrator: dispatches to backend managers by platform and drives batch rollouts.
// ABOUTME: Coordinates auxiliary infrastructure before and after the deployments it runs.

mod config;
mod infrastructure;

pub use config::{
    LoadBalancerConfig, MonitoringSetup, NetworkSetup, OrchestrationConfig, SecurityPolicy,
    SecuritySetup, ServiceMeshConfig,
};
pub use infrastructure::{InfrastructureError, InfrastructureProvider, TracingInfrastructure};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::deploy::{DeployError, DeployErrorKind};
use crate::model::{DeploymentConfig, DeploymentResult, DeploymentStatus, DeploymentUpdate, Phase};
use crate::platform::{Platform, PlatformAdapter};

/// Outcome of a batch operation.
///
/// `success` is false only when the batch as a whole could not run; a
/// failed deployment inside a batch shows up in `results` alone.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub platform: Platform,
    pub message: String,
    pub results: Vec<DeploymentResult>,
    /// Infrastructure steps that ran, in order.
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<DeployErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl OrchestrationResult {
    fn new(platform: Platform) -> Self {
        Self {
            success: true,
            platform,
            message: String::new(),
            results: Vec::new(),
            steps: Vec::new(),
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    fn fail(&mut self, error: &DeployError) {
        self.success = false;
        self.message = error.to_string();
        self.error_kind = Some(error.kind());
    }

    /// Number of per-deployment results that succeeded.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| !r.success)
    }

    fn summarize(&mut self, verb: &str) {
        self.message = format!(
            "{verb} {} of {} deployment(s)",
            self.succeeded(),
            self.results.len()
        );
    }
}

/// Aggregated status of several deployments on one platform.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationStatus {
    pub platform: Platform,
    pub phase: Phase,
    pub deployments: BTreeMap<String, DeploymentStatus>,
}

/// Roll individual phases up into one.
///
/// Failed wins over Pending, Pending over Unknown; all-Succeeded stays
/// Succeeded; anything else is Running.
pub fn aggregate_phase<'a>(phases: impl IntoIterator<Item = &'a Phase>) -> Phase {
    let phases: Vec<Phase> = phases.into_iter().copied().collect();
    if phases.is_empty() {
        return Phase::Unknown;
    }
    for dominant in [Phase::Failed, Phase::Pending, Phase::Unknown] {
        if phases.contains(&dominant) {
            return dominant;
        }
    }
    if phases.iter().all(|p| *p == Phase::Succeeded) {
        Phase::Succeeded
    } else {
        Phase::Running
    }
}

pub struct Orchestrator {
    backends: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    infrastructure: Arc<dyn InfrastructureProvider>,
}

impl Orchestrator {
    pub fn new(infrastructure: Arc<dyn InfrastructureProvider>) -> Self {
        Self {
            backends: HashMap::new(),
            infrastructure,
        }
    }

    /// Register the manager that handles `platform`.
    pub fn with_backend(mut self, platform: Platform, backend: Arc<dyn PlatformAdapter>) -> Self {
        self.backends.insert(platform, backend);
        self
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.backends.keys().copied()
    }

    /// Manager for `platform`, or `UnsupportedPlatform` if none was configured.
    pub fn backend(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>, DeployError> {
        self.backends
            .get(&platform)
            .ok_or_else(|| DeployError::UnsupportedPlatform(platform.to_string()))
    }

    /// Deploy a batch with its surrounding infrastructure.
    pub async fn orchestrate(
        &self,
        deployments: Vec<DeploymentConfig>,
        config: &OrchestrationConfig,
    ) -> OrchestrationResult {
        let mut outcome = OrchestrationResult::new(config.platform);
        match self.run_orchestration(deployments, config, &mut outcome).await {
            Ok(()) => outcome.summarize("deployed"),
            Err(e) => {
                tracing::error!(platform = %config.platform, error = %e, "orchestration failed");
                outcome.fail(&e);
            }
        }
        outcome
    }

    async fn run_orchestration(
        &self,
        deployments: Vec<DeploymentConfig>,
        config: &OrchestrationConfig,
        outcome: &mut OrchestrationResult,
    ) -> Result<(), DeployError> {
        let platform = config.platform;
        let backend = self.backend(platform)?;
        let infra = self.infrastructure.as_ref();

        if let Some(network) = &config.networking {
            infra.setup_networking(platform, network).await?;
            outcome.steps.push("networking".to_string());
        }
        if let Some(security) = &config.security {
            infra.setup_security(platform, security).await?;
            outcome.steps.push("security".to_string());
        }
        if let Some(monitoring) = &config.monitoring {
            infra.setup_monitoring(platform, monitoring).await?;
            outcome.steps.push("monitoring".to_string());
        }

        let ids: Vec<String> = deployments.iter().map(|d| d.id.clone()).collect();
        tracing::info!(%platform, count = ids.len(), "deploying batch");
        outcome.results = join_all(deployments.into_iter().map(|d| backend.deploy(d))).await;
        for failed in outcome.failed() {
            tracing::warn!(deployment = %failed.deployment_id, message = %failed.message, "deployment in batch failed");
        }

        if let Some(mesh) = &config.service_mesh {
            infra.configure_service_mesh(platform, mesh, &ids).await?;
            outcome.steps.push("service-mesh".to_string());
        }
        if let Some(balancer) = &config.load_balancer {
            infra.configure_load_balancer(platform, balancer, &ids).await?;
            outcome.steps.push("load-balancer".to_string());
        }
        if let Some(stack) = config.monitoring.as_ref().and_then(|m| m.stack.as_deref()) {
            infra.configure_monitoring_stack(platform, stack, &ids).await?;
            outcome.steps.push("monitoring-stack".to_string());
        }
        if !config.security_policies.is_empty() {
            infra
                .apply_security_policies(platform, &config.security_policies, &ids)
                .await?;
            outcome.steps.push("security-policies".to_string());
        }
        Ok(())
    }

    /// Scale each id independently; one failure does not stop the others.
    pub async fn scale_orchestration(
        &self,
        platform: Platform,
        replicas: &BTreeMap<String, u32>,
    ) -> OrchestrationResult {
        let mut outcome = OrchestrationResult::new(platform);
        match self.backend(platform) {
            Ok(backend) => {
                outcome.results =
                    join_all(replicas.iter().map(|(id, n)| backend.scale(id, *n))).await;
                outcome.summarize("scaled");
            }
            Err(e) => outcome.fail(&e),
        }
        outcome
    }

    /// Update each id independently; one failure does not stop the others.
    pub async fn update_orchestration(
        &self,
        platform: Platform,
        updates: BTreeMap<String, DeploymentUpdate>,
    ) -> OrchestrationResult {
        let mut outcome = OrchestrationResult::new(platform);
        match self.backend(platform) {
            Ok(backend) => {
                outcome.results = join_all(
                    updates
                        .into_iter()
                        .map(|(id, update)| async move { backend.update(&id, update).await }),
                )
                .await;
                outcome.summarize("updated");
            }
            Err(e) => outcome.fail(&e),
        }
        outcome
    }

    pub async fn orchestration_status(
        &self,
        platform: Platform,
        ids: &[String],
    ) -> Result<OrchestrationStatus, DeployError> {
        let backend = self.backend(platform)?;
        let statuses = join_all(ids.iter().map(|id| backend.get_status(id))).await;
        let deployments: BTreeMap<String, DeploymentStatus> =
            ids.iter().cloned().zip(statuses).collect();

        Ok(OrchestrationStatus {
            platform,
            phase: aggregate_phase(deployments.values().map(|s| &s.phase)),
            deployments,
        })
    }
}
