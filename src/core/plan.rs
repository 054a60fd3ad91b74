//! Dry-run plan derived from the operating mode

use crate::core::defaults::{TURTLES_BASELINE_VERSION, TURTLES_IMAGE_TAG};
use crate::core::mode::{ClusterSource, IngressFlavor, OperatingMode, ServiceExposure};
use crate::core::stage::StageId;
use serde::Serialize;

/// How the bootstrap cluster is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterAction {
    Attach,
    CreateLocal,
    CreateManaged,
}

impl ClusterAction {
    pub fn label(&self) -> &'static str {
        match self {
            ClusterAction::Attach => "attach existing cluster",
            ClusterAction::CreateLocal => "create local cluster",
            ClusterAction::CreateManaged => "create managed-cloud cluster",
        }
    }
}

/// What teardown does with the bootstrap cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterTeardown {
    Delete,
    Detach,
    Skip,
}

impl ClusterTeardown {
    pub fn label(&self) -> &'static str {
        match self {
            ClusterTeardown::Delete => "delete cluster",
            ClusterTeardown::Detach => "detach from existing cluster",
            ClusterTeardown::Skip => "keep cluster (skip cleanup)",
        }
    }
}

/// One planned step and a short description of its derived parameters
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub stage: StageId,
    pub detail: String,
}

/// Ordered setup and teardown steps for a mode
#[derive(Debug, Clone, Serialize)]
pub struct SuitePlan {
    pub mode: String,
    pub cluster_action: ClusterAction,
    pub ingress_flavor: IngressFlavor,
    pub platform_patches: bool,
    pub git_exposure: ServiceExposure,
    pub cluster_teardown: ClusterTeardown,
    pub setup: Vec<PlannedStep>,
    pub teardown: Vec<PlannedStep>,
}

impl SuitePlan {
    /// Derive the plan; pure, no I/O
    pub fn from_mode(mode: &OperatingMode, skip_cleanup: bool) -> Self {
        let cluster_action = match mode.cluster_source {
            ClusterSource::Existing => ClusterAction::Attach,
            ClusterSource::Local => ClusterAction::CreateLocal,
            ClusterSource::ManagedCloud => ClusterAction::CreateManaged,
        };
        let cluster_teardown = if skip_cleanup {
            ClusterTeardown::Skip
        } else if cluster_action == ClusterAction::Attach {
            ClusterTeardown::Detach
        } else {
            ClusterTeardown::Delete
        };
        let ingress_flavor = mode.ingress_flavor();
        let platform_patches = mode.applies_platform_patches();
        let git_exposure = mode.git_exposure();

        let setup = StageId::SETUP
            .iter()
            .map(|&stage| {
                let detail = match stage {
                    StageId::ProvisionCluster => cluster_action.label().to_string(),
                    StageId::DeployIngress => format!("{} ingress", ingress_flavor.label()),
                    StageId::DeployPlatform => {
                        if platform_patches {
                            "cert-manager, rancher with ingress and service patches".to_string()
                        } else {
                            "cert-manager, rancher".to_string()
                        }
                    }
                    StageId::InstallAddOn => format!("rancher-turtles {}", TURTLES_BASELINE_VERSION),
                    StageId::DeployChartRegistry => "chartmuseum with local chart".to_string(),
                    StageId::UpgradeAddOn => {
                        format!("rancher-turtles to local image {}", TURTLES_IMAGE_TAG)
                    }
                    StageId::DeployGitService => format!("gitea exposed as {}", git_exposure),
                    other => unreachable!("{} is not a setup stage", other),
                };
                PlannedStep { stage, detail }
            })
            .collect();

        let teardown = StageId::TEARDOWN
            .iter()
            .map(|&stage| {
                let detail = match stage {
                    StageId::UninstallGitService => "helm uninstall gitea".to_string(),
                    StageId::UninstallAddOn => "helm uninstall rancher-turtles".to_string(),
                    StageId::CleanupCluster => cluster_teardown.label().to_string(),
                    other => unreachable!("{} is not a teardown step", other),
                };
                PlannedStep { stage, detail }
            })
            .collect();

        Self {
            mode: mode.label(),
            cluster_action,
            ingress_flavor,
            platform_patches,
            git_exposure,
            cluster_teardown,
            setup,
            teardown,
        }
    }
}
