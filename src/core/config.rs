//! E2E configuration file loaded from YAML

use crate::core::interval::WaitInterval;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Top-level configuration loaded from the e2e config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct E2EConfig {
    /// Name of the bootstrap cluster to create or attach to
    #[serde(default = "default_cluster_name")]
    pub management_cluster_name: String,

    /// Variables available to every stage
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Wait intervals keyed by `<scope>/<phase>`
    #[serde(default)]
    pub intervals: HashMap<String, Vec<String>>,

    /// Providers materialized into the local repository
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Images to load into a freshly created local cluster
    #[serde(default)]
    pub images: Vec<ImageConfig>,
}

/// Provider declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default)]
    pub versions: Vec<ProviderVersion>,
}

/// One version of a provider and the files that make it up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVersion {
    /// Version label, e.g. `v1.7.0`
    pub name: String,

    /// Path to the components file
    pub value: String,

    /// Extra files copied next to the components file
    #[serde(default)]
    pub files: Vec<ProviderFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFile {
    pub source_path: String,

    #[serde(default)]
    pub target_name: Option<String>,
}

/// Image to side-load into the bootstrap cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub name: String,

    #[serde(default)]
    pub load_behavior: LoadBehavior,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadBehavior {
    /// Loading failure aborts cluster creation
    #[default]
    MustLoad,
    /// Loading failure is logged and ignored
    TryLoad,
}

fn default_cluster_name() -> String {
    "testenv-bootstrap".to_string()
}

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable regex"))
}

/// Replace `${NAME}` references using `lookup`; unknown names are left as-is
pub fn expand_variables<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    variable_regex()
        .replace_all(template, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

impl E2EConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: E2EConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that every declared interval parses
    pub fn validate(&self) -> Result<()> {
        for (key, values) in &self.intervals {
            WaitInterval::from_pair(values)
                .with_context(|| format!("Invalid interval '{}'", key))?;
        }
        for provider in &self.providers {
            if provider.versions.is_empty() {
                anyhow::bail!("Provider '{}' declares no versions", provider.name);
            }
        }
        Ok(())
    }

    /// Look up a variable, letting the process environment override the file
    ///
    /// `${NAME}` references inside the value are expanded with the same lookup.
    pub fn get_variable(&self, name: &str) -> Option<String> {
        self.raw_variable(name).map(|value| {
            expand_variables(&value, |inner| {
                if inner == name {
                    None
                } else {
                    self.raw_variable(inner)
                }
            })
        })
    }

    fn raw_variable(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .or_else(|| self.variables.get(name).cloned())
    }

    /// All variables with overrides and expansion applied
    pub fn resolved_variables(&self) -> BTreeMap<String, String> {
        self.variables
            .keys()
            .filter_map(|key| self.get_variable(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Wait interval for `phase`, scoped to `cluster_name` with a `default/` fallback
    pub fn get_intervals(&self, cluster_name: &str, phase: &str) -> WaitInterval {
        let scoped = format!("{}/{}", cluster_name, phase);
        let fallback = format!("default/{}", phase);

        let values = self
            .intervals
            .get(&scoped)
            .or_else(|| self.intervals.get(&fallback));

        match values.map(|v| WaitInterval::from_pair(v)) {
            Some(Ok(interval)) => interval,
            Some(Err(e)) => {
                warn!("Interval '{}' is invalid ({}), using default", phase, e);
                WaitInterval::default()
            }
            None => {
                warn!(
                    "No interval configured for '{}' or '{}', using default",
                    scoped, fallback
                );
                WaitInterval::default()
            }
        }
    }
}
