//! CLI command definitions

use crate::collab::{
    ClusterProvisioning, Collaborators, EksctlCli, HelmCli, KindCli, KubectlCli,
};
use crate::core::flags::SuiteFlags;
use crate::core::hooks::{default_post_upgrade_hooks, DeploymentRef, VerificationHook};
use crate::core::mode::ModeFlags;
use crate::execution::{NoSpecs, SpecCommand, SuiteBody};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Flags that select the operating mode
#[derive(Debug, Args, Clone, Default)]
pub struct ModeArgs {
    /// Attach to an existing cluster instead of creating one
    #[arg(long, env = "USE_EXISTING_CLUSTER")]
    pub use_existing_cluster: bool,

    /// Create the cluster through the managed cloud provisioner
    #[arg(long = "use-eks", env = "MANAGEMENT_CLUSTER_ENVIRONMENT_EKS")]
    pub use_eks: bool,

    /// Expose everything through the cluster node instead of a tunnel
    #[arg(long, env = "ISOLATED_MODE")]
    pub isolated_mode: bool,

    /// Expose the Git service through its own ingress
    #[arg(long, env = "GITEA_CUSTOM_INGRESS")]
    pub gitea_custom_ingress: bool,
}

impl ModeArgs {
    pub fn to_mode_flags(&self) -> ModeFlags {
        ModeFlags {
            use_existing_cluster: self.use_existing_cluster,
            use_managed_cloud: self.use_eks,
            isolated_networking: self.isolated_mode,
            custom_git_ingress: self.gitea_custom_ingress,
        }
    }
}

/// Run the full lifecycle: setup, specs, teardown
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the e2e config file
    #[arg(short, long, env = "E2E_CONFIG")]
    pub config: PathBuf,

    /// Folder where run artifacts and logs are written
    #[arg(long, env = "ARTIFACTS_FOLDER", default_value = "_artifacts")]
    pub artifacts_folder: PathBuf,

    #[arg(long, env = "HELM_BINARY_PATH")]
    pub helm_binary_path: PathBuf,

    /// Locally built add-on chart used for the upgrade
    #[arg(long, env = "TURTLES_PATH")]
    pub chart_path: PathBuf,

    /// Directory with per-stage extra values files
    #[arg(long, env = "HELM_EXTRA_VALUES_FOLDER")]
    pub helm_extra_values_dir: Option<PathBuf>,

    #[arg(long, env = "KIND_BINARY_PATH", default_value = "kind")]
    pub kind_binary_path: PathBuf,

    #[arg(long, env = "KUBECTL_BINARY_PATH", default_value = "kubectl")]
    pub kubectl_binary_path: PathBuf,

    #[arg(long, env = "EKSCTL_BINARY_PATH", default_value = "eksctl")]
    pub eksctl_binary_path: PathBuf,

    /// Region passed to the managed cloud provisioner
    #[arg(long, env = "EKS_REGION")]
    pub eks_region: Option<String>,

    /// Values overlay for the Git service chart
    #[arg(long, env = "GITEA_VALUES_PATH")]
    pub gitea_values_path: Option<PathBuf>,

    #[command(flatten)]
    pub mode: ModeArgs,

    /// Keep the cluster after the run
    #[arg(long, env = "SKIP_RESOURCE_CLEANUP")]
    pub skip_cleanup: bool,

    /// Kubeconfig of the cluster to attach to
    #[arg(long, env = "EXISTING_KUBECONFIG")]
    pub existing_kubeconfig: Option<PathBuf>,

    /// Extra deployment that must be available after the upgrade (NAMESPACE/NAME)
    #[arg(long = "post-upgrade-check", value_name = "NAMESPACE/NAME")]
    pub post_upgrade_checks: Vec<DeploymentRef>,

    /// Command run between setup and teardown
    #[arg(long, env = "SPEC_COMMAND")]
    pub spec_command: Option<String>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn to_flags(&self) -> SuiteFlags {
        SuiteFlags {
            config_path: self.config.clone(),
            artifacts_folder: self.artifacts_folder.clone(),
            helm_binary_path: self.helm_binary_path.clone(),
            chart_path: self.chart_path.clone(),
            helm_extra_values_dir: self.helm_extra_values_dir.clone(),
            gitea_values_path: self.gitea_values_path.clone(),
            existing_kubeconfig: self.existing_kubeconfig.clone(),
            use_existing_cluster: self.mode.use_existing_cluster,
            use_managed_cloud: self.mode.use_eks,
            isolated_mode: self.mode.isolated_mode,
            gitea_custom_ingress: self.mode.gitea_custom_ingress,
            skip_cleanup: self.skip_cleanup,
        }
    }

    /// Default hooks followed by every `--post-upgrade-check`
    pub fn post_upgrade_hooks(&self) -> Vec<VerificationHook> {
        let mut hooks = default_post_upgrade_hooks();
        hooks.extend(
            self.post_upgrade_checks
                .iter()
                .cloned()
                .map(VerificationHook::deployment_available),
        );
        hooks
    }

    /// Subprocess-backed collaborators for the configured binaries
    pub fn collaborators(&self) -> Collaborators {
        let kubectl = KubectlCli::new(self.kubectl_binary_path.clone());
        let kind = KindCli::new(self.kind_binary_path.clone());
        let eks: Arc<dyn ClusterProvisioning> = Arc::new(
            EksctlCli::new(self.eksctl_binary_path.clone()).with_region(self.eks_region.clone()),
        );
        Collaborators {
            provisioner: Arc::new(kind),
            custom_provisioner: Some(eks),
            charts: Arc::new(HelmCli::new(self.helm_binary_path.clone())),
            readiness: Arc::new(kubectl.clone()),
            manifests: Arc::new(kubectl),
        }
    }

    pub fn body(&self) -> Box<dyn SuiteBody> {
        match &self.spec_command {
            Some(command) if !command.trim().is_empty() => Box::new(SpecCommand::new(command.clone())),
            _ => Box::new(NoSpecs),
        }
    }
}

/// Print the setup and teardown plan without touching a cluster
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub mode: ModeArgs,

    #[arg(long, env = "SKIP_RESOURCE_CLEANUP")]
    pub skip_cleanup: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate an e2e config file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the e2e config file
    #[arg(short, long, env = "E2E_CONFIG")]
    pub config: PathBuf,

    /// Mode whose required variables are checked
    #[command(flatten)]
    pub mode: ModeArgs,
}

/// Show previous suite runs
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
