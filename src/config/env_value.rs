// ABOUTME: Environment and secret values that are literal or read from the process env.
// ABOUTME: Resolution happens at deploy time so manifests never hold live secrets.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// A literal kept out of persisted state. Serialized as `null`.
    Withheld,
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
            EnvValue::Withheld => Err(Error::WithheldValue),
        }
    }

    /// Whether writing this value out would expose its content.
    pub fn is_literal(&self) -> bool {
        matches!(self, EnvValue::Literal(_))
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::Literal(value.to_string())
    }
}
