//! Operating mode derived from suite flags
//!
//! The mode flags look like independent booleans but only a handful of
//! combinations are meaningful downstream. [`OperatingMode::select`] resolves
//! them once, with explicit precedence, so every later stage branches on a
//! tagged value instead of re-evaluating flags.

use crate::core::flags::SuiteFlags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw mode flags, the only input to mode selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeFlags {
    pub use_existing_cluster: bool,
    pub use_managed_cloud: bool,
    pub isolated_networking: bool,
    pub custom_git_ingress: bool,
}

impl From<&SuiteFlags> for ModeFlags {
    fn from(flags: &SuiteFlags) -> Self {
        Self {
            use_existing_cluster: flags.use_existing_cluster,
            use_managed_cloud: flags.use_managed_cloud,
            isolated_networking: flags.isolated_mode,
            custom_git_ingress: flags.gitea_custom_ingress,
        }
    }
}

/// Where the bootstrap cluster comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterSource {
    /// Attach to a caller-supplied cluster
    Existing,
    /// Create a local cluster
    Local,
    /// Create through the managed-cloud provisioner
    ManagedCloud,
}

/// Network mode, resolved with isolated > managed cloud > local tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    LocalTunnel,
    ManagedCloud,
    Isolated,
}

/// Ingress controller flavor deployed by the ingress stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngressFlavor {
    /// Tunnel-based ingress for local clusters
    Tunnel,
    /// Cloud-native load-balanced nginx
    CloudNative,
    /// Fully custom nginx with a caller-provided hostname
    Custom,
}

impl IngressFlavor {
    pub fn label(&self) -> &'static str {
        match self {
            IngressFlavor::Tunnel => "tunnel",
            IngressFlavor::CloudNative => "cloud-native",
            IngressFlavor::Custom => "custom",
        }
    }
}

/// Kubernetes service type used to expose the Git service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceExposure {
    NodePort,
    LoadBalancer,
    ClusterIP,
}

impl ServiceExposure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceExposure::NodePort => "NodePort",
            ServiceExposure::LoadBalancer => "LoadBalancer",
            ServiceExposure::ClusterIP => "ClusterIP",
        }
    }
}

impl fmt::Display for ServiceExposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatingMode {
    pub flags: ModeFlags,
    pub cluster_source: ClusterSource,
    pub network: NetworkMode,
    pub custom_git_ingress: bool,
}

impl OperatingMode {
    /// Pure, deterministic mode selection
    pub fn select(flags: ModeFlags) -> Self {
        let cluster_source = if flags.use_existing_cluster {
            ClusterSource::Existing
        } else if flags.use_managed_cloud {
            ClusterSource::ManagedCloud
        } else {
            ClusterSource::Local
        };

        let network = if flags.isolated_networking {
            NetworkMode::Isolated
        } else if flags.use_managed_cloud {
            NetworkMode::ManagedCloud
        } else {
            NetworkMode::LocalTunnel
        };

        Self {
            flags,
            cluster_source,
            network,
            custom_git_ingress: flags.custom_git_ingress,
        }
    }

    pub fn ingress_flavor(&self) -> IngressFlavor {
        match self.network {
            NetworkMode::Isolated => IngressFlavor::Custom,
            NetworkMode::ManagedCloud => IngressFlavor::CloudNative,
            NetworkMode::LocalTunnel => IngressFlavor::Tunnel,
        }
    }

    /// Git exposure: custom ingress wins, then the managed-cloud provider
    pub fn git_exposure(&self) -> ServiceExposure {
        if self.custom_git_ingress {
            ServiceExposure::ClusterIP
        } else if self.flags.use_managed_cloud {
            ServiceExposure::LoadBalancer
        } else {
            ServiceExposure::NodePort
        }
    }

    /// Platform ingress and service patches only apply behind the local tunnel
    pub fn applies_platform_patches(&self) -> bool {
        self.network == NetworkMode::LocalTunnel
    }

    /// A managed-cloud run needs the custom cluster provisioner
    pub fn requires_custom_provisioner(&self) -> bool {
        self.flags.use_managed_cloud
    }

    pub fn is_isolated(&self) -> bool {
        self.network == NetworkMode::Isolated
    }

    /// Short human label, e.g. `local/local-tunnel`
    pub fn label(&self) -> String {
        let source = match self.cluster_source {
            ClusterSource::Existing => "existing",
            ClusterSource::Local => "local",
            ClusterSource::ManagedCloud => "managed-cloud",
        };
        let network = match self.network {
            NetworkMode::LocalTunnel => "local-tunnel",
            NetworkMode::ManagedCloud => "managed-cloud",
            NetworkMode::Isolated => "isolated",
        };
        if self.custom_git_ingress {
            format!("{}/{}+custom-git-ingress", source, network)
        } else {
            format!("{}/{}", source, network)
        }
    }
}
