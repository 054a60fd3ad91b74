//! Collaborator contracts and their CLI-backed implementations
//!
//! Stages never shell out themselves; everything that touches a cluster goes
//! through one of the traits below so tests can swap in recording mocks.

pub mod command;
pub mod eks;
pub mod error;
pub mod helm;
pub mod kind;
pub mod kubectl;
pub mod wait;

use crate::core::config::ImageConfig;
use crate::core::context::{ClusterHandle, ClusterOrigin};
use crate::core::hooks::DeploymentRef;
use crate::core::interval::WaitInterval;
use crate::core::mode::ServiceExposure;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use command::CommandSpec;
pub use eks::EksctlCli;
pub use error::CollaboratorError;
pub use helm::HelmCli;
pub use kind::KindCli;
pub use kubectl::KubectlCli;

/// Everything a provisioner needs to create or attach a cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterRequest {
    pub name: String,
    pub kubernetes_version: String,
    pub artifacts_folder: PathBuf,
    pub clusterctl_config_path: PathBuf,

    /// Kubeconfig of a caller-supplied cluster
    pub existing_kubeconfig: Option<PathBuf>,

    /// Images to load into a fresh cluster
    pub images: Vec<ImageConfig>,
}

/// Creates, attaches to and deletes bootstrap clusters
#[async_trait]
pub trait ClusterProvisioning: Send + Sync {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, CollaboratorError>;

    /// Attach to the cluster behind `existing_kubeconfig`, then `KUBECONFIG`,
    /// then `~/.kube/config`
    async fn attach(&self, request: &ClusterRequest) -> Result<ClusterHandle, CollaboratorError> {
        let kubeconfig = request
            .existing_kubeconfig
            .clone()
            .or_else(|| std::env::var_os("KUBECONFIG").map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|home| home.join(".kube").join("config")))
            .ok_or_else(|| {
                CollaboratorError::InvalidResponse("no kubeconfig for existing cluster".to_string())
            })?;
        if !kubeconfig.is_file() {
            return Err(CollaboratorError::InvalidResponse(format!(
                "kubeconfig {} does not exist",
                kubeconfig.display()
            )));
        }
        Ok(ClusterHandle {
            name: request.name.clone(),
            kubeconfig_path: kubeconfig,
            origin: ClusterOrigin::Existing,
            isolated_hostname: None,
        })
    }

    async fn delete(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;
}

/// A helm release to install or upgrade
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRelease {
    pub name: String,
    /// Chart reference: `repo/chart`, a URL or a local path
    pub chart: String,
    pub namespace: String,
    pub version: Option<String>,
    pub values: BTreeMap<String, String>,
    /// Values helm must keep as strings, such as credentials
    pub string_values: BTreeMap<String, String>,
    pub values_files: Vec<PathBuf>,
    /// Bounds helm's own `--wait`
    pub wait: WaitInterval,
}

impl ChartRelease {
    pub fn new(
        name: impl Into<String>,
        chart: impl Into<String>,
        namespace: impl Into<String>,
        wait: WaitInterval,
    ) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            version: None,
            values: BTreeMap::new(),
            string_values: BTreeMap::new(),
            values_files: Vec::new(),
            wait,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into()).filter(|v: &String| !v.is_empty());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_string_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.string_values.insert(key.into(), value.into());
        self
    }

    pub fn with_values(mut self, values: BTreeMap<String, String>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn with_values_file(mut self, path: Option<PathBuf>) -> Self {
        self.values_files.extend(path);
        self
    }
}

/// Installs, upgrades and removes helm charts
#[async_trait]
pub trait ChartDeployer: Send + Sync {
    async fn add_repo(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;

    async fn install(
        &self,
        cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;

    async fn upgrade(
        &self,
        cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;

    /// Remove a release; a missing release is not an error
    async fn uninstall(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
        wait: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;

    /// Push a packaged chart into a chart registry repo
    async fn push_chart(
        &self,
        cluster: &ClusterHandle,
        chart_path: &Path,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;
}

/// Blocks until cluster objects become ready
#[async_trait]
pub trait ReadinessChecker: Send + Sync {
    async fn wait_for_deployment_available(
        &self,
        cluster: &ClusterHandle,
        deployment: &DeploymentRef,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;

    /// Wait until the service is reachable and return its `host:port`
    async fn wait_for_service(
        &self,
        cluster: &ClusterHandle,
        namespace: &str,
        name: &str,
        exposure: ServiceExposure,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError>;

    /// Address of the first node, used to derive hostnames in isolated mode
    async fn node_address(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError>;
}

/// Applies rendered manifests to a cluster
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply(
        &self,
        cluster: &ClusterHandle,
        manifest: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError>;
}

/// The collaborators a suite run is wired with
#[derive(Clone)]
pub struct Collaborators {
    /// Local provisioner, also used to attach to existing clusters
    pub provisioner: Arc<dyn ClusterProvisioning>,

    /// Required when running against a managed cloud
    pub custom_provisioner: Option<Arc<dyn ClusterProvisioning>>,

    pub charts: Arc<dyn ChartDeployer>,
    pub readiness: Arc<dyn ReadinessChecker>,
    pub manifests: Arc<dyn ManifestApplier>,
}

impl Collaborators {
    /// Provisioner responsible for `cluster`
    pub fn provisioner_for(&self, cluster: &ClusterHandle) -> Arc<dyn ClusterProvisioning> {
        match (&cluster.origin, &self.custom_provisioner) {
            (ClusterOrigin::ManagedCloud, Some(custom)) => custom.clone(),
            _ => self.provisioner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_release_builder() {
        let release = ChartRelease::new(
            "gitea",
            "gitea-charts/gitea",
            "default",
            WaitInterval::default(),
        )
        .with_version("")
        .with_value("service.http.type", "NodePort")
        .with_string_value("gitea.admin.password", "1234")
        .with_values_file(None);

        assert_eq!(release.version, None);
        assert_eq!(release.values["service.http.type"], "NodePort");
        assert_eq!(release.string_values["gitea.admin.password"], "1234");
        assert!(!release.values.contains_key("gitea.admin.password"));
        assert!(release.values_files.is_empty());
    }
}
