//! Stage identifiers and per-stage bookkeeping

use crate::core::state::StageState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every step the suite engine can run, setup and teardown alike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    ResolveConfig,
    ProvisionCluster,
    DeployIngress,
    DeployPlatform,
    InstallAddOn,
    DeployChartRegistry,
    UpgradeAddOn,
    DeployGitService,
    RunSpecs,
    UninstallGitService,
    UninstallAddOn,
    CleanupCluster,
}

impl StageId {
    /// Setup stages in the order the engine runs them
    pub const SETUP: [StageId; 7] = [
        StageId::ProvisionCluster,
        StageId::DeployIngress,
        StageId::DeployPlatform,
        StageId::InstallAddOn,
        StageId::DeployChartRegistry,
        StageId::UpgradeAddOn,
        StageId::DeployGitService,
    ];

    /// Teardown steps in strict reverse dependency order
    pub const TEARDOWN: [StageId; 3] = [
        StageId::UninstallGitService,
        StageId::UninstallAddOn,
        StageId::CleanupCluster,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageId::ResolveConfig => "resolve-config",
            StageId::ProvisionCluster => "provision-cluster",
            StageId::DeployIngress => "deploy-ingress",
            StageId::DeployPlatform => "deploy-platform",
            StageId::InstallAddOn => "install-addon",
            StageId::DeployChartRegistry => "deploy-chart-registry",
            StageId::UpgradeAddOn => "upgrade-addon",
            StageId::DeployGitService => "deploy-git-service",
            StageId::RunSpecs => "run-specs",
            StageId::UninstallGitService => "uninstall-git-service",
            StageId::UninstallAddOn => "uninstall-addon",
            StageId::CleanupCluster => "cleanup-cluster",
        }
    }

    pub fn is_teardown(&self) -> bool {
        Self::TEARDOWN.contains(self)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of one stage as recorded by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub state: StageState,
}

impl StageRecord {
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            state: StageState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_and_teardown_are_disjoint() {
        for stage in StageId::SETUP {
            assert!(!stage.is_teardown(), "{} should be a setup stage", stage);
        }
        for stage in StageId::TEARDOWN {
            assert!(stage.is_teardown());
        }
    }

    #[test]
    fn test_stage_names_are_kebab_case() {
        assert_eq!(StageId::UpgradeAddOn.to_string(), "upgrade-addon");
        let json = serde_json::to_string(&StageId::DeployGitService).unwrap();
        assert_eq!(json, "\"deploy-git-service\"");
    }
}
