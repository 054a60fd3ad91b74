//! Resolves flags and the config file into a frozen run configuration

use crate::core::config::E2EConfig;
use crate::core::flags::SuiteFlags;
use crate::core::defaults::vars;
use crate::core::interval::WaitInterval;
use crate::core::mode::{ClusterSource, IngressFlavor, OperatingMode};
use crate::error::SuiteError;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Immutable configuration shared by every stage of a run
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub config_path: PathBuf,
    pub artifacts_folder: PathBuf,
    pub helm_binary_path: PathBuf,
    pub chart_path: PathBuf,
    pub helm_extra_values_dir: Option<PathBuf>,
    pub gitea_values_path: Option<PathBuf>,
    pub existing_kubeconfig: Option<PathBuf>,
    pub skip_cleanup: bool,

    /// Generated `clusterctl-config.yaml` of the local provider repository
    pub clusterctl_config_path: PathBuf,

    /// Variables after environment overrides and `${VAR}` expansion
    pub variables: BTreeMap<String, String>,

    config: E2EConfig,
}

impl RunConfiguration {
    /// Build a configuration without touching the filesystem
    pub fn new(flags: &SuiteFlags, config: E2EConfig, clusterctl_config_path: PathBuf) -> Self {
        Self {
            config_path: flags.config_path.clone(),
            artifacts_folder: flags.artifacts_folder.clone(),
            helm_binary_path: flags.helm_binary_path.clone(),
            chart_path: flags.chart_path.clone(),
            helm_extra_values_dir: flags.helm_extra_values_dir.clone(),
            gitea_values_path: flags.gitea_values_path.clone(),
            existing_kubeconfig: flags.existing_kubeconfig.clone(),
            skip_cleanup: flags.skip_cleanup,
            clusterctl_config_path,
            variables: config.resolved_variables(),
            config,
        }
    }

    pub fn config(&self) -> &E2EConfig {
        &self.config
    }

    pub fn management_cluster_name(&self) -> &str {
        &self.config.management_cluster_name
    }

    /// Get a variable
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Get a variable that a stage cannot run without
    pub fn require(&self, name: &str) -> Result<&str, SuiteError> {
        self.variable(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SuiteError::precondition(format!("variable {} is not set", name)))
    }

    /// Wait interval for a phase on the given cluster
    pub fn intervals(&self, cluster_name: &str, phase: &str) -> WaitInterval {
        self.config.get_intervals(cluster_name, phase)
    }

    /// Extra values file for a stage, if present in the extra values directory
    pub fn extra_values(&self, file_name: &str) -> Option<PathBuf> {
        self.helm_extra_values_dir
            .as_ref()
            .map(|dir| dir.join(file_name))
            .filter(|path| path.is_file())
    }
}

/// Validates preconditions and produces a [`RunConfiguration`]
pub struct ConfigResolver;

impl ConfigResolver {
    /// Resolve flags into a run configuration
    ///
    /// Fails before any stage runs if a required file is missing. Creates the
    /// artifact folder and materializes the local provider repository into it.
    pub fn resolve(flags: &SuiteFlags) -> Result<RunConfiguration, SuiteError> {
        require_file(&flags.config_path, "config file")?;

        create_artifacts_folder(&flags.artifacts_folder).map_err(|e| {
            SuiteError::precondition(format!(
                "can't create artifacts folder {}: {}",
                flags.artifacts_folder.display(),
                e
            ))
        })?;

        require_file(&flags.helm_binary_path, "helm binary")?;
        require_file(&flags.chart_path, "chart path")?;
        if let Some(values) = &flags.gitea_values_path {
            require_file(values, "gitea values file")?;
        }
        if let Some(dir) = &flags.helm_extra_values_dir {
            if !dir.is_dir() {
                return Err(SuiteError::precondition(format!(
                    "helm extra values directory {} does not exist",
                    dir.display()
                )));
            }
        }

        info!("Loading the e2e test configuration from {}", flags.config_path.display());
        let config = E2EConfig::from_file(&flags.config_path)
            .map_err(|e| SuiteError::precondition(format!("{:#}", e)))?;

        let repository = flags.artifacts_folder.join("repository");
        info!("Creating a clusterctl config into {}", repository.display());
        let config_dir = flags
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let clusterctl_config_path = create_local_repository(&config, &config_dir, &repository)
            .map_err(|e| {
                SuiteError::precondition(format!("can't create local repository: {:#}", e))
            })?;

        Ok(RunConfiguration::new(flags, config, clusterctl_config_path))
    }
}

/// Variables the setup stages read for `mode`
pub fn required_variables(mode: &OperatingMode) -> Vec<&'static str> {
    let mut names = Vec::new();
    if mode.cluster_source != ClusterSource::Existing {
        names.push(vars::KUBERNETES_MANAGEMENT_VERSION);
    }
    if !mode.is_isolated() {
        names.push(vars::RANCHER_HOSTNAME);
    }
    if mode.ingress_flavor() == IngressFlavor::Tunnel {
        names.extend([
            vars::NGROK_REPO_NAME,
            vars::NGROK_URL,
            vars::NGROK_PATH,
            vars::NGROK_API_KEY,
            vars::NGROK_AUTHTOKEN,
        ]);
    }
    names.extend([
        vars::CERT_MANAGER_REPO_NAME,
        vars::CERT_MANAGER_URL,
        vars::CERT_MANAGER_PATH,
        vars::RANCHER_REPO_NAME,
        vars::RANCHER_URL,
        vars::RANCHER_PATH,
        vars::RANCHER_PASSWORD,
        vars::GITEA_REPO_NAME,
        vars::GITEA_REPO_URL,
        vars::GITEA_CHART_NAME,
        vars::GITEA_USER_NAME,
        vars::GITEA_USER_PWD,
    ]);
    names
}

/// Required variables that are unset or empty in `config`
pub fn missing_variables(config: &E2EConfig, mode: &OperatingMode) -> Vec<&'static str> {
    required_variables(mode)
        .into_iter()
        .filter(|name| config.get_variable(name).map_or(true, |v| v.is_empty()))
        .collect()
}

fn require_file(path: &Path, what: &str) -> Result<(), SuiteError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SuiteError::precondition(format!(
            "{} should be an existing file: {}",
            what,
            path.display()
        )))
    }
}

#[cfg(unix)]
fn create_artifacts_folder(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_artifacts_folder(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

/// Copy every provider version into `repository` and write `clusterctl-config.yaml`
///
/// Returns the path of the generated config file.
pub fn create_local_repository(
    config: &E2EConfig,
    config_dir: &Path,
    repository: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(repository)
        .with_context(|| format!("Failed to create {}", repository.display()))?;

    let mut providers = Vec::new();
    for provider in &config.providers {
        let provider_dir = repository.join(format!(
            "{}-{}",
            provider.provider_type.to_lowercase(),
            provider.name
        ));

        let mut latest_components = None;
        for version in &provider.versions {
            let version_dir = provider_dir.join(&version.name);
            fs::create_dir_all(&version_dir)?;

            let source = resolve_relative(config_dir, &version.value);
            let file_name = source
                .file_name()
                .map(|n| n.to_os_string())
                .with_context(|| format!("Provider '{}' has no components file", provider.name))?;
            let target = version_dir.join(file_name);
            fs::copy(&source, &target).with_context(|| {
                format!(
                    "Failed to copy components for {} {} from {}",
                    provider.name,
                    version.name,
                    source.display()
                )
            })?;
            debug!("Copied {} to {}", source.display(), target.display());

            for file in &version.files {
                let source = resolve_relative(config_dir, &file.source_path);
                let name = match &file.target_name {
                    Some(name) => PathBuf::from(name),
                    None => source
                        .file_name()
                        .map(PathBuf::from)
                        .with_context(|| format!("Invalid provider file {}", file.source_path))?,
                };
                fs::copy(&source, version_dir.join(&name))
                    .with_context(|| format!("Failed to copy {}", source.display()))?;
            }

            latest_components = Some(target);
        }

        if let Some(components) = latest_components {
            let mut entry = Mapping::new();
            entry.insert("name".into(), provider.name.clone().into());
            entry.insert("url".into(), components.display().to_string().into());
            entry.insert("type".into(), provider.provider_type.clone().into());
            providers.push(Value::Mapping(entry));
        }
    }

    let mut document = Mapping::new();
    document.insert("providers".into(), Value::Sequence(providers));
    for (key, value) in config.resolved_variables() {
        document.insert(key.into(), value.into());
    }

    let path = repository.join("clusterctl-config.yaml");
    fs::write(&path, serde_yaml::to_string(&document)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn resolve_relative(base: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        flags: SuiteFlags,
    }

    fn fixture(config_yaml: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("e2e.yaml");
        fs::write(&config_path, config_yaml).unwrap();
        let helm = dir.path().join("helm");
        fs::write(&helm, "#!/bin/sh\n").unwrap();
        let chart = dir.path().join("rancher-turtles.tgz");
        fs::write(&chart, "chart").unwrap();

        let flags = SuiteFlags {
            config_path,
            artifacts_folder: dir.path().join("_artifacts"),
            helm_binary_path: helm,
            chart_path: chart,
            ..Default::default()
        };
        Fixture { dir, flags }
    }

    #[test]
    fn test_resolve_creates_artifacts_and_repository() {
        let fx = fixture(
            r#"
managementClusterName: turtles-e2e
variables:
  RANCHER_HOSTNAME: rancher.local
providers:
  - name: fleet
    type: AddonProvider
    versions:
      - name: v0.6.0
        value: fleet-components.yaml
"#,
        );
        fs::write(fx.dir.path().join("fleet-components.yaml"), "kind: List").unwrap();

        let run = ConfigResolver::resolve(&fx.flags).unwrap();

        assert!(fx.flags.artifacts_folder.is_dir());
        assert_eq!(run.management_cluster_name(), "turtles-e2e");
        assert_eq!(run.variable("RANCHER_HOSTNAME"), Some("rancher.local"));

        let copied = fx
            .flags
            .artifacts_folder
            .join("repository/addonprovider-fleet/v0.6.0/fleet-components.yaml");
        assert!(copied.is_file());

        let generated = fs::read_to_string(&run.clusterctl_config_path).unwrap();
        assert!(generated.contains("fleet"));
        assert!(generated.contains("RANCHER_HOSTNAME"));
    }

    #[test]
    fn test_missing_config_file_is_precondition_error() {
        let mut fx = fixture("variables: {}");
        fx.flags.config_path = fx.dir.path().join("missing.yaml");

        let err = ConfigResolver::resolve(&fx.flags).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("missing.yaml"));
        assert!(!fx.flags.artifacts_folder.exists(), "nothing runs after a failed precondition");
    }

    #[test]
    fn test_missing_helm_binary_fails() {
        let mut fx = fixture("variables: {}");
        fx.flags.helm_binary_path = fx.dir.path().join("no-helm");

        let err = ConfigResolver::resolve(&fx.flags).unwrap_err();
        assert!(err.to_string().contains("helm binary"));
    }

    #[test]
    fn test_missing_chart_fails() {
        let mut fx = fixture("variables: {}");
        fx.flags.chart_path = fx.dir.path().join("no-chart.tgz");

        let err = ConfigResolver::resolve(&fx.flags).unwrap_err();
        assert!(err.to_string().contains("chart path"));
    }

    #[test]
    fn test_missing_provider_file_fails() {
        let fx = fixture(
            r#"
providers:
  - name: fleet
    type: AddonProvider
    versions:
      - name: v0.6.0
        value: does-not-exist.yaml
"#,
        );
        let err = ConfigResolver::resolve(&fx.flags).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("local repository"));
    }

    #[test]
    fn test_require_reports_variable_name() {
        let fx = fixture("variables:\n  EMPTY: \"\"\n");
        let run = ConfigResolver::resolve(&fx.flags).unwrap();
        let err = run.require("EMPTY").unwrap_err();
        assert!(err.to_string().contains("EMPTY"));
        assert!(run.require("TESTENV_NEVER_DEFINED").is_err());
    }

    #[test]
    fn test_required_variables_follow_mode() {
        use crate::core::mode::ModeFlags;

        let local = OperatingMode::select(ModeFlags::default());
        let required = required_variables(&local);
        assert!(required.contains(&vars::NGROK_AUTHTOKEN));
        assert!(required.contains(&vars::RANCHER_HOSTNAME));

        let isolated = OperatingMode::select(ModeFlags {
            use_existing_cluster: true,
            isolated_networking: true,
            ..Default::default()
        });
        let required = required_variables(&isolated);
        assert!(!required.contains(&vars::NGROK_AUTHTOKEN));
        assert!(!required.contains(&vars::RANCHER_HOSTNAME));
        assert!(!required.contains(&vars::KUBERNETES_MANAGEMENT_VERSION));
        assert!(required.contains(&vars::GITEA_USER_PWD));
    }

    #[test]
    fn test_missing_variables_reports_empty_values() {
        let config = E2EConfig::from_yaml(
            "variables:\n  TESTENV_UNUSED: x\n  GITEA_REPO_NAME: \"\"\n",
        )
        .unwrap();
        let mode = OperatingMode::select(Default::default());
        let missing = missing_variables(&config, &mode);
        if std::env::var(vars::GITEA_REPO_NAME).is_err() {
            assert!(missing.contains(&vars::GITEA_REPO_NAME));
        }
    }
}
