//! Suite flags as handed over by the CLI

use std::path::PathBuf;

/// Flag values consumed by the config resolver and the mode selector
#[derive(Debug, Clone, Default)]
pub struct SuiteFlags {
    pub config_path: PathBuf,
    pub artifacts_folder: PathBuf,
    pub helm_binary_path: PathBuf,
    pub chart_path: PathBuf,

    /// Directory holding per-stage extra values files
    pub helm_extra_values_dir: Option<PathBuf>,

    /// Values overlay for the Git service chart
    pub gitea_values_path: Option<PathBuf>,

    /// Kubeconfig of the cluster to attach to with `use_existing_cluster`
    pub existing_kubeconfig: Option<PathBuf>,

    pub use_existing_cluster: bool,
    pub use_managed_cloud: bool,
    pub isolated_mode: bool,
    pub gitea_custom_ingress: bool,
    pub skip_cleanup: bool,
}
