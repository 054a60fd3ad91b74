//! Helm CLI chart deployer

use crate::collab::{ChartDeployer, ChartRelease, CollaboratorError, CommandSpec};
use crate::core::context::ClusterHandle;
use crate::core::interval::WaitInterval;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Extra time given to the helm process on top of its own `--timeout`
const PROCESS_SLACK: Duration = Duration::from_secs(60);

/// Limit for quick commands such as `helm repo add`
const QUICK_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Chart deployer backed by the helm binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm_path: PathBuf,
}

impl HelmCli {
    pub fn new(helm_path: impl Into<PathBuf>) -> Self {
        Self {
            helm_path: helm_path.into(),
        }
    }

    fn command(&self, cluster: &ClusterHandle) -> CommandSpec {
        CommandSpec::new(&self.helm_path).kubeconfig(&cluster.kubeconfig_path)
    }

    /// Arguments for `helm upgrade [--install]`
    pub fn upgrade_args(release: &ChartRelease, install: bool) -> Vec<String> {
        let mut args = vec!["upgrade".to_string()];
        if install {
            args.push("--install".to_string());
        }
        args.extend([
            release.name.clone(),
            release.chart.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
            "--wait".to_string(),
            "--timeout".to_string(),
            release.wait.helm_timeout(),
        ]);
        if install {
            args.push("--create-namespace".to_string());
        }
        if let Some(version) = &release.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        for file in &release.values_files {
            args.push("--values".to_string());
            args.push(file.display().to_string());
        }
        for (key, value) in &release.values {
            args.push("--set".to_string());
            args.push(format!("{}={}", key, escape_set_value(value)));
        }
        for (key, value) in &release.string_values {
            args.push("--set-string".to_string());
            args.push(format!("{}={}", key, escape_set_value(value)));
        }
        args
    }
}

/// Escape a value for `--set`, where `,` separates entries and `\` escapes
fn escape_set_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ChartDeployer for HelmCli {
    async fn add_repo(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Adding helm repo {} ({})", name, url);
        self.command(cluster)
            .args(["repo", "add", name, url, "--force-update"])
            .run(QUICK_COMMAND_TIMEOUT, cancel)
            .await?;
        Ok(())
    }

    async fn install(
        &self,
        cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Installing {} from {} into {}", release.name, release.chart, release.namespace);
        self.command(cluster)
            .args(Self::upgrade_args(release, true))
            .run(release.wait.timeout + PROCESS_SLACK, cancel)
            .await?;
        Ok(())
    }

    async fn upgrade(
        &self,
        cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Upgrading {} in {}", release.name, release.namespace);
        self.command(cluster)
            .args(Self::upgrade_args(release, false))
            .run(release.wait.timeout + PROCESS_SLACK, cancel)
            .await?;
        Ok(())
    }

    async fn uninstall(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
        wait: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Uninstalling {} from {}", name, namespace);
        self.command(cluster)
            .args([
                "uninstall",
                name,
                "--namespace",
                namespace,
                "--ignore-not-found",
                "--wait",
                "--timeout",
            ])
            .arg(wait.helm_timeout())
            .run(wait.timeout + PROCESS_SLACK, cancel)
            .await?;
        Ok(())
    }

    async fn push_chart(
        &self,
        cluster: &ClusterHandle,
        chart_path: &Path,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        info!("Pushing {} to {}", chart_path.display(), repo);
        self.command(cluster)
            .arg("cm-push")
            .arg(chart_path.display().to_string())
            .arg(repo)
            .run(QUICK_COMMAND_TIMEOUT, cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_args() {
        let release = ChartRelease::new(
            "rancher-turtles",
            "turtles/rancher-turtles",
            "rancher-turtles-system",
            WaitInterval::new(Duration::from_secs(900), Duration::from_secs(10)),
        )
        .with_version("v0.6.0")
        .with_value("rancherTurtles.imagePullPolicy", "Never");

        let args = HelmCli::upgrade_args(&release, true);
        assert_eq!(&args[..4], ["upgrade", "--install", "rancher-turtles", "turtles/rancher-turtles"]);
        assert!(args.contains(&"--create-namespace".to_string()));
        assert!(args.windows(2).any(|w| w == ["--timeout", "900s"]));
        assert!(args.windows(2).any(|w| w == ["--version", "v0.6.0"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--set", "rancherTurtles.imagePullPolicy=Never"]));
    }

    #[test]
    fn test_upgrade_does_not_install() {
        let release = ChartRelease::new("gitea", "./gitea.tgz", "default", WaitInterval::default())
            .with_values_file(Some(PathBuf::from("/values/gitea.yaml")));
        let args = HelmCli::upgrade_args(&release, false);
        assert!(!args.contains(&"--install".to_string()));
        assert!(!args.contains(&"--create-namespace".to_string()));
        assert!(args.windows(2).any(|w| w == ["--values", "/values/gitea.yaml"]));
    }

    #[test]
    fn test_credentials_are_passed_as_escaped_strings() {
        let release = ChartRelease::new("gitea", "gitea-charts/gitea", "default", WaitInterval::default())
            .with_value("service.http.type", "NodePort")
            .with_string_value("gitea.admin.password", "x,y\\z #1")
            .with_string_value("gitea.admin.username", "12345");

        let args = HelmCli::upgrade_args(&release, true);
        assert!(args
            .windows(2)
            .any(|w| w == ["--set-string", "gitea.admin.password=x\\,y\\\\z #1"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--set-string", "gitea.admin.username=12345"]));
        assert!(args.windows(2).any(|w| w == ["--set", "service.http.type=NodePort"]));
    }

    #[test]
    fn test_set_values_escape_separators() {
        assert_eq!(escape_set_value("plain"), "plain");
        assert_eq!(escape_set_value("a,b"), "a\\,b");
        assert_eq!(escape_set_value("c:\\dir"), "c:\\\\dir");
    }
}
