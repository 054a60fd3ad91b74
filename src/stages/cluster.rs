//! Bootstrap cluster acquisition and cleanup

use crate::collab::{ClusterRequest, Collaborators};
use crate::core::context::ClusterHandle;
use crate::core::mode::{ClusterSource, OperatingMode};
use crate::core::resolver::RunConfiguration;
use crate::core::stage::StageId;
use crate::error::SuiteError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What cluster cleanup ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCleanup {
    Deleted,
    Detached,
    Skipped,
}

/// Acquires or creates the bootstrap cluster
pub struct ClusterProvisioner<'a> {
    collab: &'a Collaborators,
}

impl<'a> ClusterProvisioner<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self { collab }
    }

    /// Attach to an existing cluster or create one, depending on mode
    pub async fn provision(
        &self,
        config: &RunConfiguration,
        mode: &OperatingMode,
        kubernetes_version: &str,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, SuiteError> {
        let stage = StageId::ProvisionCluster;
        let request = ClusterRequest {
            name: config.management_cluster_name().to_string(),
            kubernetes_version: kubernetes_version.to_string(),
            artifacts_folder: config.artifacts_folder.clone(),
            clusterctl_config_path: config.clusterctl_config_path.clone(),
            existing_kubeconfig: config.existing_kubeconfig.clone(),
            images: config.config().images.clone(),
        };

        let mut cluster = self.acquire(&request, mode, cancel).await?;

        if mode.is_isolated() {
            match self.collab.readiness.node_address(&cluster, cancel).await {
                Ok(address) => {
                    let hostname = format!("{}.sslip.io", address);
                    info!("Isolated hostname: {}", hostname);
                    cluster.isolated_hostname = Some(hostname);
                }
                Err(e) => {
                    self.discard(&cluster).await;
                    return Err(SuiteError::from_collaborator(stage, &cluster.name, e));
                }
            }
        }

        Ok(cluster)
    }

    async fn acquire(
        &self,
        request: &ClusterRequest,
        mode: &OperatingMode,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, SuiteError> {
        let failed = |e| SuiteError::from_collaborator(StageId::ProvisionCluster, &request.name, e);
        let provisioner = match mode.cluster_source {
            ClusterSource::Existing => {
                info!("Attaching to existing cluster {}", request.name);
                return self.collab.provisioner.attach(request).await.map_err(failed);
            }
            _ if mode.requires_custom_provisioner() => {
                self.collab.custom_provisioner.as_ref().ok_or_else(|| {
                    SuiteError::precondition("managed-cloud runs need a custom cluster provisioner")
                })?
            }
            _ => &self.collab.provisioner,
        };

        if request.kubernetes_version.is_empty() {
            return Err(SuiteError::precondition(
                "a Kubernetes version is required to create a cluster",
            ));
        }

        info!(
            "Creating bootstrap cluster {} ({})",
            request.name, request.kubernetes_version
        );
        provisioner.create(request, cancel).await.map_err(failed)
    }

    /// Delete a cluster this run created but could not finish preparing
    ///
    /// Runs on its own token so a cancelled setup still removes the cluster.
    async fn discard(&self, cluster: &ClusterHandle) {
        if cluster.is_existing() {
            return;
        }
        warn!("Deleting cluster {} after failed setup", cluster.name);
        let cancel = CancellationToken::new();
        if let Err(e) = self.collab.provisioner_for(cluster).delete(cluster, &cancel).await {
            warn!("Failed to delete cluster {}: {}", cluster.name, e);
        }
    }

    /// Delete a created cluster; existing clusters are only detached
    pub async fn cleanup(
        &self,
        cluster: &ClusterHandle,
        skip_cleanup: bool,
        cancel: &CancellationToken,
    ) -> Result<ClusterCleanup, SuiteError> {
        if skip_cleanup {
            info!("Skipping cleanup of cluster {}", cluster.name);
            return Ok(ClusterCleanup::Skipped);
        }
        if cluster.is_existing() {
            info!("Detaching from existing cluster {}", cluster.name);
            return Ok(ClusterCleanup::Detached);
        }
        self.collab
            .provisioner_for(cluster)
            .delete(cluster, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(StageId::CleanupCluster, &cluster.name, e))?;
        Ok(ClusterCleanup::Deleted)
    }
}
