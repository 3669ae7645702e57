// ABOUTME: Deployment intent, canonical status and operation results.
// ABOUTME: Shared by every backend manager and the orchestrator.

mod config;
mod result;
mod status;

pub use config::{
    BuildSpec, ChartRef, DeploymentConfig, DeploymentUpdate, HealthCheckConfig, HttpGetAction,
    IngressSpec, NetworkingConfig, PortSpec, Probe, ProbeAction, Protocol, ResourceQuantities,
    ResourceRequirements, ScalingConfig,
};
pub use result::{DeploymentResult, RollbackInfo, RollbackStrategy};
pub use status::{Condition, ConditionStatus, DeploymentStatus, Phase, ReplicaCounts};
