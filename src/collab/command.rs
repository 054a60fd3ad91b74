//! Subprocess runner shared by the CLI-backed collaborators

use crate::collab::CollaboratorError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A command line to run
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Point the command at a cluster through `KUBECONFIG`
    pub fn kubeconfig(self, path: &Path) -> Self {
        self.env("KUBECONFIG", path.display().to_string())
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program and first two args, enough to identify the call in errors
    pub fn display(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());
        let head: Vec<&str> = self.args.iter().take(2).map(String::as_str).collect();
        format!("{} {}", program, head.join(" ")).trim_end().to_string()
    }

    /// Run the command, bounded by `limit` and `cancel`
    ///
    /// Returns stdout on success. The child is killed when the limit elapses
    /// or the token fires.
    pub async fn run(
        &self,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        debug!("Running {} {}", self.program.display(), self.args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CollaboratorError::command_failed(self.display(), format!("failed to spawn: {}", e))
            })?;

        if let (Some(input), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            drop(pipe);
        }

        let output = tokio::select! {
            result = timeout(limit, child.wait_with_output()) => {
                result.map_err(|_| CollaboratorError::Timeout {
                    what: self.display(),
                    after: limit,
                })??
            }
            _ = cancel.cancelled() => return Err(CollaboratorError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.display(), exit_code, stderr.trim());
            return Err(CollaboratorError::command_failed(
                self.display(),
                format!("exit code {}: {}", exit_code, stderr.trim()),
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            CollaboratorError::InvalidResponse(format!("{} wrote non UTF-8 output: {}", self.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_short() {
        let spec = CommandSpec::new("/usr/local/bin/helm")
            .args(["upgrade", "--install", "rancher", "rancher-stable/rancher"]);
        assert_eq!(spec.display(), "helm upgrade --install");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout_and_stdin() {
        let out = CommandSpec::new("cat")
            .stdin("apiVersion: v1\n")
            .run(Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "apiVersion: v1\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let err = CommandSpec::new("false")
            .run(Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_and_cancel_are_distinct() {
        let err = CommandSpec::new("sleep")
            .arg("5")
            .run(Duration::from_millis(50), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout { .. }));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = CommandSpec::new("sleep")
            .arg("5")
            .run(Duration::from_secs(10), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let err = CommandSpec::new("/nonexistent/testenv-binary")
            .run(Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
