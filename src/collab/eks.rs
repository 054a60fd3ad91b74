//! Managed-cloud bootstrap clusters through eksctl

use crate::collab::{ClusterProvisioning, ClusterRequest, CollaboratorError, CommandSpec};
use crate::core::context::{ClusterHandle, ClusterOrigin};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// EKS control planes are slow to come up
const CREATE_TIMEOUT: Duration = Duration::from_secs(40 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Provisioner for EKS clusters
#[derive(Debug, Clone)]
pub struct EksctlCli {
    eksctl_path: PathBuf,
    region: Option<String>,
}

impl EksctlCli {
    pub fn new(eksctl_path: impl Into<PathBuf>) -> Self {
        Self {
            eksctl_path: eksctl_path.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    pub fn create_args(&self, request: &ClusterRequest, kubeconfig: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            request.name.clone(),
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
        ];
        if !request.kubernetes_version.is_empty() {
            // eksctl takes `1.30`, not `v1.30.0`
            let version = request.kubernetes_version.trim_start_matches('v');
            let minor: Vec<&str> = version.split('.').take(2).collect();
            args.push("--version".to_string());
            args.push(minor.join("."));
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }
}

#[async_trait]
impl ClusterProvisioning for EksctlCli {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, CollaboratorError> {
        let kubeconfig = request.artifacts_folder.join("kubeconfig");
        info!("Creating EKS cluster {}", request.name);
        CommandSpec::new(&self.eksctl_path)
            .args(self.create_args(request, &kubeconfig))
            .run(CREATE_TIMEOUT, cancel)
            .await?;

        Ok(ClusterHandle {
            name: request.name.clone(),
            kubeconfig_path: kubeconfig,
            origin: ClusterOrigin::ManagedCloud,
            isolated_hostname: None,
        })
    }

    async fn delete(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Deleting EKS cluster {}", cluster.name);
        let mut command = CommandSpec::new(&self.eksctl_path)
            .args(["delete", "cluster", "--name", cluster.name.as_str(), "--wait"]);
        if let Some(region) = &self.region {
            command = command.args(["--region", region.as_str()]);
        }
        command.run(DELETE_TIMEOUT, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_trimmed_to_minor() {
        let eksctl = EksctlCli::new("eksctl").with_region(Some("eu-west-2".to_string()));
        let request = ClusterRequest {
            name: "turtles-e2e".to_string(),
            kubernetes_version: "v1.30.2".to_string(),
            ..Default::default()
        };
        let args = eksctl.create_args(&request, std::path::Path::new("kubeconfig"));
        assert!(args.windows(2).any(|w| w == ["--version", "1.30"]));
        assert!(args.windows(2).any(|w| w == ["--region", "eu-west-2"]));
    }
}
