//! Suite context - state threaded from setup through teardown

use crate::core::hooks::VerificationHook;
use crate::core::interval::WaitInterval;
use crate::core::mode::{IngressFlavor, OperatingMode, ServiceExposure};
use crate::core::resolver::RunConfiguration;
use crate::core::stage::{StageId, StageRecord};
use crate::core::state::{AddOnState, SuiteState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the bootstrap cluster was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterOrigin {
    /// Supplied by the caller; detached, never deleted
    Existing,
    Local,
    ManagedCloud,
}

/// Read-only handle to the bootstrap cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHandle {
    pub name: String,
    pub kubeconfig_path: PathBuf,
    pub origin: ClusterOrigin,

    /// Hostname substituted for the configured one in isolated mode
    pub isolated_hostname: Option<String>,
}

impl ClusterHandle {
    pub fn is_existing(&self) -> bool {
        self.origin == ClusterOrigin::Existing
    }
}

/// Result of the ingress stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressResult {
    pub flavor: IngressFlavor,
}

/// Result of the platform stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    /// Hostname the platform answers on
    pub hostname: String,
    pub patches_applied: bool,
}

/// Result of the Git service stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitServiceResult {
    /// Reachable endpoint, e.g. `http://172.18.0.2:30000`
    pub endpoint: String,
    pub exposure: ServiceExposure,
    pub username: String,

    /// Name of the basic-auth secret holding the credentials
    pub auth_secret: String,
    pub namespace: String,
    pub release: String,
}

/// Everything a suite run accumulates
///
/// Created by the engine, mutated only by setup stages, then handed to
/// teardown. Specs only ever get a shared reference.
#[derive(Debug)]
pub struct SuiteContext {
    pub config: RunConfiguration,
    pub mode: OperatingMode,
    pub state: SuiteState,

    /// Platform hostname; replaced by the isolated hostname once known
    pub hostname: String,

    pub cluster: Option<ClusterHandle>,
    pub ingress: Option<IngressResult>,
    pub platform: Option<PlatformResult>,
    pub addon: AddOnState,
    pub git: Option<GitServiceResult>,

    /// Hooks run after the add-on upgrade, in order
    pub post_upgrade_hooks: Vec<VerificationHook>,

    /// Stage records in execution order
    pub records: Vec<StageRecord>,
}

impl SuiteContext {
    pub fn new(
        config: RunConfiguration,
        mode: OperatingMode,
        post_upgrade_hooks: Vec<VerificationHook>,
    ) -> Self {
        let hostname = config
            .variable(crate::core::defaults::vars::RANCHER_HOSTNAME)
            .unwrap_or_default()
            .to_string();
        Self {
            config,
            mode,
            state: SuiteState::new(),
            hostname,
            cluster: None,
            ingress: None,
            platform: None,
            addon: AddOnState::default(),
            git: None,
            post_upgrade_hooks,
            records: Vec::new(),
        }
    }

    /// Name used to scope interval lookups
    pub fn cluster_name(&self) -> &str {
        match &self.cluster {
            Some(cluster) => &cluster.name,
            None => self.config.management_cluster_name(),
        }
    }

    /// Wait interval for a phase on this run's cluster
    pub fn interval(&self, phase: &str) -> WaitInterval {
        self.config.intervals(self.cluster_name(), phase)
    }

    /// Record for a stage, created on first access
    pub fn record_mut(&mut self, stage: StageId) -> &mut StageRecord {
        if let Some(pos) = self.records.iter().position(|r| r.stage == stage) {
            &mut self.records[pos]
        } else {
            self.records.push(StageRecord::new(stage));
            let last = self.records.len() - 1;
            &mut self.records[last]
        }
    }

    pub fn record(&self, stage: StageId) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::E2EConfig;
    use crate::core::flags::SuiteFlags;
    use crate::core::mode::ModeFlags;
    use std::time::Duration;

    fn context(yaml: &str) -> SuiteContext {
        let config = E2EConfig::from_yaml(yaml).unwrap();
        let run = RunConfiguration::new(&SuiteFlags::default(), config, PathBuf::new());
        SuiteContext::new(run, OperatingMode::select(ModeFlags::default()), Vec::new())
    }

    #[test]
    fn test_interval_scoped_by_cluster_name() {
        let mut ctx = context(
            r#"
managementClusterName: bootstrap
intervals:
  bootstrap/wait-rancher: ["5m", "5s"]
  kind-e2e/wait-rancher: ["20m", "30s"]
"#,
        );
        assert_eq!(ctx.interval("wait-rancher").timeout, Duration::from_secs(300));

        ctx.cluster = Some(ClusterHandle {
            name: "kind-e2e".to_string(),
            kubeconfig_path: PathBuf::from("/tmp/kubeconfig"),
            origin: ClusterOrigin::Local,
            isolated_hostname: None,
        });
        assert_eq!(ctx.interval("wait-rancher").timeout, Duration::from_secs(1200));
    }

    #[test]
    fn test_record_mut_keeps_one_record_per_stage() {
        let mut ctx = context("variables:\n  RANCHER_HOSTNAME: rancher.example.com\n");
        assert_eq!(ctx.hostname, "rancher.example.com");

        ctx.record_mut(StageId::DeployIngress);
        ctx.record_mut(StageId::DeployPlatform);
        ctx.record_mut(StageId::DeployIngress);
        assert_eq!(ctx.records.len(), 2);
        assert_eq!(ctx.records[0].stage, StageId::DeployIngress);
    }
}
