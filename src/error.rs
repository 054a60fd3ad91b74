//! Error types for suite orchestration

use crate::collab::CollaboratorError;
use crate::core::stage::StageId;
use crate::core::state::AddOnState;
use std::time::Duration;
use thiserror::Error;

/// Fatal errors raised while setting up or tearing down a suite
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SuiteError {
    /// Missing file, flag or variable; detected before any stage runs
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A cluster or chart deployment failed outright
    #[error("{stage} failed: {message}")]
    Provisioning { stage: StageId, message: String },

    /// Deployed, but not ready within the configured interval
    #[error("{stage}: {target} not ready after {timeout:?}")]
    ReadinessTimeout {
        stage: StageId,
        target: String,
        timeout: Duration,
    },

    /// A post-upgrade verification hook did not pass
    #[error("post-upgrade verification '{hook}' failed: {message}")]
    Verification { hook: String, message: String },

    /// External cancellation observed while the stage was running
    #[error("{stage} cancelled")]
    Cancelled { stage: StageId },

    /// Add-on state machine asked to skip a state
    #[error("invalid add-on transition from {from} to {to}")]
    InvalidTransition { from: AddOnState, to: AddOnState },
}

/// Coarse error category used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Provisioning,
    ReadinessTimeout,
    Verification,
    Cancelled,
}

impl SuiteError {
    /// Create a precondition error with the given message
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a provisioning error for a stage
    pub fn provisioning(stage: StageId, msg: impl Into<String>) -> Self {
        Self::Provisioning {
            stage,
            message: msg.into(),
        }
    }

    /// Translate a collaborator failure for `target` into the stage's error
    pub fn from_collaborator(stage: StageId, target: &str, err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Timeout { after, .. } => Self::ReadinessTimeout {
                stage,
                target: target.to_string(),
                timeout: after,
            },
            CollaboratorError::Cancelled => Self::Cancelled { stage },
            other => Self::Provisioning {
                stage,
                message: format!("{}: {}", target, other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SuiteError::Precondition(_) => ErrorKind::Precondition,
            SuiteError::Provisioning { .. } | SuiteError::InvalidTransition { .. } => {
                ErrorKind::Provisioning
            }
            SuiteError::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            SuiteError::Verification { .. } => ErrorKind::Verification,
            SuiteError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_readiness_timeout() {
        let err = SuiteError::from_collaborator(
            StageId::DeployIngress,
            "deployment ingress-nginx/ingress-nginx-controller",
            CollaboratorError::Timeout {
                what: "deployment available".to_string(),
                after: Duration::from_secs(600),
            },
        );
        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
        assert!(err.to_string().contains("ingress-nginx-controller"));
        assert!(err.to_string().contains("deploy-ingress"));
    }

    #[test]
    fn test_cancellation_is_distinct_from_timeout() {
        let err = SuiteError::from_collaborator(
            StageId::DeployPlatform,
            "rancher",
            CollaboratorError::Cancelled,
        );
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_ne!(err.kind(), ErrorKind::ReadinessTimeout);
    }

    #[test]
    fn test_command_failure_maps_to_provisioning() {
        let err = SuiteError::from_collaborator(
            StageId::InstallAddOn,
            "rancher-turtles",
            CollaboratorError::CommandFailed {
                command: "helm upgrade --install".to_string(),
                message: "chart not found".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Provisioning);
        assert!(err.to_string().contains("chart not found"));
    }
}
