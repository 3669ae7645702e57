// ABOUTME: Custom serde deserializers for manifest types.
// ABOUTME: Enforces a non-empty, duplicate-free deployment list.

use std::collections::BTreeSet;

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::model::DeploymentConfig;

pub fn deserialize_deployments<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<DeploymentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let deployments: Vec<DeploymentConfig> = Vec::deserialize(deserializer)?;

    let mut seen = BTreeSet::new();
    for deployment in &deployments {
        if !seen.insert(deployment.id.as_str()) {
            return Err(serde::de::Error::custom(format!(
                "duplicate deployment id: {}",
                deployment.id
            )));
        }
    }

    NonEmpty::from_vec(deployments)
        .ok_or_else(|| serde::de::Error::custom("at least one deployment is required"))
}
