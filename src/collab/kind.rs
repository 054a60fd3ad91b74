//! Local bootstrap clusters through the kind CLI

use crate::collab::{ClusterProvisioning, ClusterRequest, CollaboratorError, CommandSpec};
use crate::core::config::LoadBehavior;
use crate::core::context::{ClusterHandle, ClusterOrigin};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CREATE_TIMEOUT: Duration = Duration::from_secs(600);
const DELETE_TIMEOUT: Duration = Duration::from_secs(300);
const LOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Provisioner for local kind clusters
#[derive(Debug, Clone)]
pub struct KindCli {
    kind_path: PathBuf,
}

impl KindCli {
    pub fn new(kind_path: impl Into<PathBuf>) -> Self {
        Self {
            kind_path: kind_path.into(),
        }
    }

    /// Arguments for `kind create cluster`
    pub fn create_args(request: &ClusterRequest, kubeconfig: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            request.name.clone(),
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
            "--wait".to_string(),
            "5m".to_string(),
        ];
        if !request.kubernetes_version.is_empty() {
            args.push("--image".to_string());
            args.push(format!("kindest/node:{}", request.kubernetes_version));
        }
        args
    }

    async fn load_images(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        for image in &request.images {
            info!("Loading image {} into {}", image.name, request.name);
            let result = CommandSpec::new(&self.kind_path)
                .args(["load", "docker-image", image.name.as_str(), "--name", request.name.as_str()])
                .run(LOAD_TIMEOUT, cancel)
                .await;
            match (result, image.load_behavior) {
                (Ok(_), _) => {}
                (Err(CollaboratorError::Cancelled), _) => return Err(CollaboratorError::Cancelled),
                (Err(e), LoadBehavior::TryLoad) => {
                    warn!("Failed to load optional image {}: {}", image.name, e)
                }
                (Err(e), LoadBehavior::MustLoad) => return Err(e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterProvisioning for KindCli {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, CollaboratorError> {
        let kubeconfig = request.artifacts_folder.join("kubeconfig");
        info!("Creating kind cluster {}", request.name);
        CommandSpec::new(&self.kind_path)
            .args(Self::create_args(request, &kubeconfig))
            .run(CREATE_TIMEOUT, cancel)
            .await?;

        let handle = ClusterHandle {
            name: request.name.clone(),
            kubeconfig_path: kubeconfig,
            origin: ClusterOrigin::Local,
            isolated_hostname: None,
        };

        if let Err(e) = self.load_images(request, cancel).await {
            // the caller never sees a handle, so nothing else would delete it
            let cleanup = CancellationToken::new();
            if let Err(delete_err) = self.delete(&handle, &cleanup).await {
                warn!("Failed to delete cluster {} after image load failure: {}", handle.name, delete_err);
            }
            return Err(e);
        }

        Ok(handle)
    }

    async fn delete(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Deleting kind cluster {}", cluster.name);
        CommandSpec::new(&self.kind_path)
            .args(["delete", "cluster", "--name", cluster.name.as_str()])
            .arg("--kubeconfig")
            .arg(cluster.kubeconfig_path.display().to_string())
            .run(DELETE_TIMEOUT, cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_args_pin_node_image() {
        let request = ClusterRequest {
            name: "turtles-e2e".to_string(),
            kubernetes_version: "v1.30.0".to_string(),
            ..Default::default()
        };
        let args = KindCli::create_args(&request, std::path::Path::new("/tmp/_artifacts/kubeconfig"));
        assert_eq!(&args[..4], ["create", "cluster", "--name", "turtles-e2e"]);
        assert!(args.windows(2).any(|w| w == ["--image", "kindest/node:v1.30.0"]));
        assert!(args.windows(2).any(|w| w == ["--kubeconfig", "/tmp/_artifacts/kubeconfig"]));
    }

    #[test]
    fn test_create_args_without_version_uses_kind_default() {
        let request = ClusterRequest {
            name: "e2e".to_string(),
            ..Default::default()
        };
        let args = KindCli::create_args(&request, std::path::Path::new("kubeconfig"));
        assert!(!args.contains(&"--image".to_string()));
    }

    #[cfg(unix)]
    fn fake_kind(dir: &std::path::Path, load_exit: i32) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("kind");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$*\" >> {}\n[ \"$1\" = load ] && exit {}\nexit 0\n",
                log.display(),
                load_exit
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[cfg(unix)]
    fn request_with_image(dir: &std::path::Path, load_behavior: LoadBehavior) -> ClusterRequest {
        ClusterRequest {
            name: "e2e".to_string(),
            kubernetes_version: "v1.30.0".to_string(),
            artifacts_folder: dir.to_path_buf(),
            images: vec![crate::core::config::ImageConfig {
                name: "img:v1".to_string(),
                load_behavior,
            }],
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_image_load_deletes_created_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let (script, log) = fake_kind(dir.path(), 1);
        let kind = KindCli::new(script);

        let result = kind
            .create(&request_with_image(dir.path(), LoadBehavior::MustLoad), &CancellationToken::new())
            .await;
        assert!(result.is_err());

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 3, "{:?}", calls);
        assert!(calls[0].starts_with("create cluster --name e2e"));
        assert!(calls[1].starts_with("load docker-image img:v1"));
        assert!(calls[2].starts_with("delete cluster --name e2e"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_optional_image_failure_keeps_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let (script, log) = fake_kind(dir.path(), 1);
        let kind = KindCli::new(script);

        let handle = kind
            .create(&request_with_image(dir.path(), LoadBehavior::TryLoad), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.kubeconfig_path, dir.path().join("kubeconfig"));

        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(!calls.contains("delete cluster"));
    }
}
