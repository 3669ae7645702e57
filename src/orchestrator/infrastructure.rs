// ABOUTME: Coordination point for auxiliary infrastructure around a rollout.
// ABOUTME: TracingInfrastructure records each step through structured logs only.

use async_trait::async_trait;

use crate::deploy::DeployError;
use crate::platform::Platform;

use super::config::{
    LoadBalancerConfig, MonitoringSetup, NetworkSetup, SecurityPolicy, SecuritySetup,
    ServiceMeshConfig,
};

#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {message}")]
pub struct InfrastructureError {
    pub step: &'static str,
    pub message: String,
}

impl InfrastructureError {
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

impl From<InfrastructureError> for DeployError {
    fn from(err: InfrastructureError) -> Self {
        DeployError::Platform(err.to_string())
    }
}

/// Sets up what surrounds the deployments. Called by the orchestrator only
/// for sections the orchestration config declares.
#[async_trait]
pub trait InfrastructureProvider: Send + Sync {
    async fn setup_networking(
        &self,
        platform: Platform,
        network: &NetworkSetup,
    ) -> Result<(), InfrastructureError>;

    async fn setup_security(
        &self,
        platform: Platform,
        security: &SecuritySetup,
    ) -> Result<(), InfrastructureError>;

    async fn setup_monitoring(
        &self,
        platform: Platform,
        monitoring: &MonitoringSetup,
    ) -> Result<(), InfrastructureError>;

    async fn configure_service_mesh(
        &self,
        platform: Platform,
        mesh: &ServiceMeshConfig,
        deployments: &[String],
    ) -> Result<(), InfrastructureError>;

    async fn configure_load_balancer(
        &self,
        platform: Platform,
        balancer: &LoadBalancerConfig,
        deployments: &[String],
    ) -> Result<(), InfrastructureError>;

    async fn configure_monitoring_stack(
        &self,
        platform: Platform,
        stack: &str,
        deployments: &[String],
    ) -> Result<(), InfrastructureError>;

    async fn apply_security_policies(
        &self,
        platform: Platform,
        policies: &[SecurityPolicy],
        deployments: &[String],
    ) -> Result<(), InfrastructureError>;
}

/// Logs every step and succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInfrastructure;

#[async_trait]
impl InfrastructureProvider for TracingInfrastructure {
    async fn setup_networking(
        &self,
        platform: Platform,
        network: &NetworkSetup,
    ) -> Result<(), InfrastructureError> {
        tracing::info!(%platform, network = %network.network, isolated = network.isolated, "networking set up");
        Ok(())
    }

    async fn setup_security(
        &self,
        platform: Platform,
        security: &SecuritySetup,
    ) -> Result<(), InfrastructureError> {
        tracing::info!(
            %platform,
            service_account = ?security.service_account,
            run_as_non_root = security.run_as_non_root,
            "security set up"
        );
        Ok(())
    }

    async fn setup_monitoring(
        &self,
        platform: Platform,
        monitoring: &MonitoringSetup,
    ) -> Result<(), InfrastructureError> {
        tracing::info!(
            %platform,
            metrics = monitoring.metrics,
            traces = monitoring.tracing,
            logs = monitoring.logs,
            "monitoring set up"
        );
        Ok(())
    }

    async fn configure_service_mesh(
        &self,
        platform: Platform,
        mesh: &ServiceMeshConfig,
        deployments: &[String],
    ) -> Result<(), InfrastructureError> {
        tracing::info!(%platform, provider = %mesh.provider, mtls = mesh.mtls, ?deployments, "service mesh configured");
        Ok(())
    }

    async fn configure_load_balancer(
        &self,
        platform: Platform,
        balancer: &LoadBalancerConfig,
        deployments: &[String],
    ) -> Result<(), InfrastructureError> {
        tracing::info!(%platform, kind = %balancer.kind, ports = ?balancer.ports, ?deployments, "load balancer configured");
        Ok(())
    }

    async fn configure_monitoring_stack(
        &self,
        platform: Platform,
        stack: &str,
        deployments: &[String],
    ) -> Result<(), InfrastructureError> {
        tracing::info!(%platform, stack, ?deployments, "monitoring stack configured");
        Ok(())
    }

    async fn apply_security_policies(
        &self,
        platform: Platform,
        policies: &[SecurityPolicy],
        deployments: &[String],
    ) -> Result<(), InfrastructureError> {
        for policy in policies {
            tracing::info!(%platform, policy = policy.name(), ?deployments, "security policy applied");
        }
        Ok(())
    }
}
