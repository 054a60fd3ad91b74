//! Post-upgrade verification hooks
//!
//! Hooks are plain values processed in order after the add-on upgrade; they
//! capture nothing from the surrounding suite state.

use crate::core::defaults::{phases, CAAPF_DEPLOYMENT, TURTLES_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a deployment in a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub namespace: String,
    pub name: String,
}

impl DeploymentRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeploymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment {}/{}", self.namespace, self.name)
    }
}

impl FromStr for DeploymentRef {
    type Err = String;

    /// Parse `NAMESPACE/NAME`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(format!("expected NAMESPACE/NAME, got '{}'", s)),
        }
    }
}

/// Kind of verification a hook performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VerificationHook {
    /// Deployment must report `Available` within the phase interval
    DeploymentAvailable {
        deployment: DeploymentRef,
        phase: String,
    },
}

impl VerificationHook {
    pub fn deployment_available(deployment: DeploymentRef) -> Self {
        Self::DeploymentAvailable {
            deployment,
            phase: phases::WAIT_CONTROLLERS.to_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            VerificationHook::DeploymentAvailable { deployment, .. } => {
                format!("{} available", deployment)
            }
        }
    }

    pub fn phase(&self) -> &str {
        match self {
            VerificationHook::DeploymentAvailable { phase, .. } => phase,
        }
    }
}

/// Hooks every suite registers for the add-on upgrade
pub fn default_post_upgrade_hooks() -> Vec<VerificationHook> {
    vec![VerificationHook::deployment_available(DeploymentRef::new(
        TURTLES_NAMESPACE,
        CAAPF_DEPLOYMENT,
    ))]
}
