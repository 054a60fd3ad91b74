//! What runs between setup and teardown

use crate::core::context::SuiteContext;
use crate::core::defaults::vars;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The test cases of a suite
///
/// Gets the context read-only; the cluster handle must not be replaced.
#[async_trait]
pub trait SuiteBody: Send + Sync {
    async fn run(&self, ctx: &SuiteContext, cancel: &CancellationToken) -> Result<()>;
}

/// No test cases; setup and teardown only
pub struct NoSpecs;

#[async_trait]
impl SuiteBody for NoSpecs {
    async fn run(&self, _ctx: &SuiteContext, _cancel: &CancellationToken) -> Result<()> {
        info!("No specs to run");
        Ok(())
    }
}

/// Runs an external test command through `sh -c`
#[derive(Debug, Clone)]
pub struct SpecCommand {
    command: String,
}

impl SpecCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Environment handed to the test command
    pub fn environment(ctx: &SuiteContext) -> Vec<(String, String)> {
        let mut env = vec![
            (vars::RANCHER_HOSTNAME.to_string(), ctx.hostname.clone()),
            (
                "ARTIFACTS_FOLDER".to_string(),
                ctx.config.artifacts_folder.display().to_string(),
            ),
        ];
        if let Some(cluster) = &ctx.cluster {
            env.push((
                "KUBECONFIG".to_string(),
                cluster.kubeconfig_path.display().to_string(),
            ));
        }
        if let Some(git) = &ctx.git {
            env.push(("GITEA_ENDPOINT".to_string(), git.endpoint.clone()));
            env.push(("GITEA_AUTH_SECRET".to_string(), git.auth_secret.clone()));
        }
        env
    }
}

#[async_trait]
impl SuiteBody for SpecCommand {
    async fn run(&self, ctx: &SuiteContext, cancel: &CancellationToken) -> Result<()> {
        info!("Running specs: {}", self.command);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .envs(Self::environment(ctx))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start '{}'", self.command))?;

        let status = tokio::select! {
            status = child.wait() => status.context("Failed to wait for spec command")?,
            _ = cancel.cancelled() => bail!("spec command cancelled"),
        };

        if !status.success() {
            bail!(
                "spec command exited with code {}",
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::E2EConfig;
    use crate::core::context::{ClusterHandle, ClusterOrigin, GitServiceResult};
    use crate::core::flags::SuiteFlags;
    use crate::core::mode::{ModeFlags, OperatingMode, ServiceExposure};
    use crate::core::resolver::RunConfiguration;
    use std::path::PathBuf;

    fn context() -> SuiteContext {
        let flags = SuiteFlags {
            artifacts_folder: PathBuf::from("/tmp/_artifacts"),
            ..Default::default()
        };
        let run = RunConfiguration::new(&flags, E2EConfig::from_yaml("{}").unwrap(), PathBuf::new());
        let mut ctx = SuiteContext::new(run, OperatingMode::select(ModeFlags::default()), Vec::new());
        ctx.hostname = "rancher.example.com".to_string();
        ctx.cluster = Some(ClusterHandle {
            name: "e2e".to_string(),
            kubeconfig_path: PathBuf::from("/tmp/_artifacts/kubeconfig"),
            origin: ClusterOrigin::Local,
            isolated_hostname: None,
        });
        ctx.git = Some(GitServiceResult {
            endpoint: "http://172.18.0.2:30080".to_string(),
            exposure: ServiceExposure::NodePort,
            username: "gitea".to_string(),
            auth_secret: "basic-auth-secret".to_string(),
            namespace: "default".to_string(),
            release: "gitea".to_string(),
        });
        ctx
    }

    #[test]
    fn test_environment_exports_results() {
        let env = SpecCommand::environment(&context());
        let get = |key: &str| env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("KUBECONFIG"), Some("/tmp/_artifacts/kubeconfig"));
        assert_eq!(get("RANCHER_HOSTNAME"), Some("rancher.example.com"));
        assert_eq!(get("GITEA_ENDPOINT"), Some("http://172.18.0.2:30080"));
        assert_eq!(get("GITEA_AUTH_SECRET"), Some("basic-auth-secret"));
        assert_eq!(get("ARTIFACTS_FOLDER"), Some("/tmp/_artifacts"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spec_command_sees_environment() {
        let body = SpecCommand::new("test \"$GITEA_AUTH_SECRET\" = basic-auth-secret");
        body.run(&context(), &CancellationToken::new()).await.unwrap();

        let failing = SpecCommand::new("exit 3");
        let err = failing.run(&context(), &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("code 3"));
    }
}
