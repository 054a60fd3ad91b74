//! Test utilities: recording collaborators with injectable failures

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testenv::collab::{
    ChartDeployer, ChartRelease, ClusterProvisioning, ClusterRequest, Collaborators,
    CollaboratorError, ManifestApplier, ReadinessChecker,
};
use testenv::core::config::E2EConfig;
use testenv::core::context::{ClusterHandle, ClusterOrigin, SuiteContext};
use testenv::core::flags::SuiteFlags;
use testenv::core::hooks::{default_post_upgrade_hooks, DeploymentRef};
use testenv::core::interval::WaitInterval;
use testenv::core::mode::{ModeFlags, OperatingMode, ServiceExposure};
use testenv::core::resolver::RunConfiguration;
use testenv::core::stage::StageId;
use testenv::execution::{NoSpecs, SuiteEngine, SuiteEvent, SuiteOutcome};
use tokio_util::sync::CancellationToken;

pub const NODE_ADDRESS: &str = "172.18.0.2:30080";
pub const LOAD_BALANCER_ADDRESS: &str = "gitea.elb.example.com:3000";
pub const NODE_IP: &str = "172.18.0.2";
pub const ISOLATED_HOSTNAME: &str = "172.18.0.2.sslip.io";

/// How a mocked call should misbehave
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Return a command failure
    Fail,
    /// Report a readiness timeout
    Timeout,
    /// Block until the caller's token is cancelled
    Hang,
}

/// Shared call log and failure table for every mock collaborator
#[derive(Default)]
pub struct MockWorld {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, Failure>>,
    releases: Mutex<Vec<ChartRelease>>,
    manifests: Mutex<Vec<String>>,
}

impl MockWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the call recorded as `key` misbehave
    pub fn fail_on(&self, key: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, key: &str) -> bool {
        self.calls().iter().any(|c| c == key)
    }

    /// Position of `key` in the call log
    pub fn position(&self, key: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == key)
    }

    /// Calls whose key starts with `prefix`, in order
    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Last release passed to install or upgrade under `name`
    pub fn release(&self, name: &str) -> Option<ChartRelease> {
        self.releases
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.name == name)
            .cloned()
    }

    /// Rendered manifests in the order they were applied
    pub fn applied_manifests(&self) -> Vec<String> {
        self.manifests.lock().unwrap().clone()
    }

    async fn record(
        &self,
        key: String,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), CollaboratorError> {
        let failure = self.failures.lock().unwrap().get(&key).copied();
        self.calls.lock().unwrap().push(key.clone());

        match failure {
            None => Ok(()),
            Some(Failure::Fail) => Err(CollaboratorError::command_failed(key, "injected failure")),
            Some(Failure::Timeout) => Err(CollaboratorError::Timeout {
                what: key,
                after: Duration::from_secs(1),
            }),
            Some(Failure::Hang) => match cancel {
                Some(cancel) => {
                    cancel.cancelled().await;
                    Err(CollaboratorError::Cancelled)
                }
                None => Err(CollaboratorError::command_failed(key, "hang without token")),
            },
        }
    }
}

/// Cluster provisioner mock; `kind` tells local and managed apart in the log
pub struct MockProvisioner {
    kind: &'static str,
    world: Arc<MockWorld>,
}

#[async_trait]
impl ClusterProvisioning for MockProvisioner {
    async fn create(
        &self,
        request: &ClusterRequest,
        cancel: &CancellationToken,
    ) -> Result<ClusterHandle, CollaboratorError> {
        self.world
            .record(format!("create:{}:{}", self.kind, request.name), Some(cancel))
            .await?;
        Ok(ClusterHandle {
            name: request.name.clone(),
            kubeconfig_path: request.artifacts_folder.join("kubeconfig"),
            origin: if self.kind == "managed" {
                ClusterOrigin::ManagedCloud
            } else {
                ClusterOrigin::Local
            },
            isolated_hostname: None,
        })
    }

    async fn attach(&self, request: &ClusterRequest) -> Result<ClusterHandle, CollaboratorError> {
        self.world
            .record(format!("attach:{}", request.name), None)
            .await?;
        Ok(ClusterHandle {
            name: request.name.clone(),
            kubeconfig_path: PathBuf::from("/home/ci/.kube/config"),
            origin: ClusterOrigin::Existing,
            isolated_hostname: None,
        })
    }

    async fn delete(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.world
            .record(format!("delete:{}:{}", self.kind, cluster.name), Some(cancel))
            .await
    }
}

pub struct MockCharts(Arc<MockWorld>);

#[async_trait]
impl ChartDeployer for MockCharts {
    async fn add_repo(
        &self,
        _cluster: &ClusterHandle,
        name: &str,
        _url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0.record(format!("repo:{}", name), Some(cancel)).await
    }

    async fn install(
        &self,
        _cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0.releases.lock().unwrap().push(release.clone());
        self.0
            .record(format!("install:{}", release.name), Some(cancel))
            .await
    }

    async fn upgrade(
        &self,
        _cluster: &ClusterHandle,
        release: &ChartRelease,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0.releases.lock().unwrap().push(release.clone());
        self.0
            .record(format!("upgrade:{}", release.name), Some(cancel))
            .await
    }

    async fn uninstall(
        &self,
        _cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
        _wait: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0
            .record(format!("uninstall:{}/{}", namespace, name), Some(cancel))
            .await
    }

    async fn push_chart(
        &self,
        _cluster: &ClusterHandle,
        _chart_path: &Path,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0.record(format!("push:{}", repo), Some(cancel)).await
    }
}

pub struct MockReadiness(Arc<MockWorld>);

#[async_trait]
impl ReadinessChecker for MockReadiness {
    async fn wait_for_deployment_available(
        &self,
        _cluster: &ClusterHandle,
        deployment: &DeploymentRef,
        _interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0
            .record(
                format!("wait:{}/{}", deployment.namespace, deployment.name),
                Some(cancel),
            )
            .await
    }

    async fn wait_for_service(
        &self,
        _cluster: &ClusterHandle,
        namespace: &str,
        name: &str,
        exposure: ServiceExposure,
        _interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        self.0
            .record(format!("service:{}/{}", namespace, name), Some(cancel))
            .await?;
        Ok(match exposure {
            ServiceExposure::LoadBalancer => LOAD_BALANCER_ADDRESS.to_string(),
            ServiceExposure::NodePort => NODE_ADDRESS.to_string(),
            ServiceExposure::ClusterIP => format!("{}.{}.svc:3000", name, namespace),
        })
    }

    async fn node_address(
        &self,
        cluster: &ClusterHandle,
        cancel: &CancellationToken,
    ) -> Result<String, CollaboratorError> {
        self.0
            .record(format!("node-address:{}", cluster.name), Some(cancel))
            .await?;
        Ok(NODE_IP.to_string())
    }
}

pub struct MockManifests(Arc<MockWorld>);

#[async_trait]
impl ManifestApplier for MockManifests {
    async fn apply(
        &self,
        _cluster: &ClusterHandle,
        manifest: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        self.0.manifests.lock().unwrap().push(manifest.to_string());
        self.0
            .record(format!("apply:{}", manifest_key(manifest)), Some(cancel))
            .await
    }
}

/// `Kind/name` of the first document in a manifest
pub fn manifest_key(manifest: &str) -> String {
    let kind = manifest
        .lines()
        .find_map(|l| l.strip_prefix("kind: "))
        .unwrap_or("Unknown");
    let name = manifest
        .lines()
        .find_map(|l| l.strip_prefix("  name: "))
        .unwrap_or("unnamed");
    format!("{}/{}", kind.trim(), name.trim())
}

/// Collaborators that all record into `world`
pub fn collaborators(world: &Arc<MockWorld>) -> Collaborators {
    Collaborators {
        provisioner: Arc::new(MockProvisioner {
            kind: "local",
            world: world.clone(),
        }),
        custom_provisioner: Some(Arc::new(MockProvisioner {
            kind: "managed",
            world: world.clone(),
        })),
        charts: Arc::new(MockCharts(world.clone())),
        readiness: Arc::new(MockReadiness(world.clone())),
        manifests: Arc::new(MockManifests(world.clone())),
    }
}

pub const CONFIG: &str = r#"
managementClusterName: testenv-e2e
variables:
  RANCHER_HOSTNAME: rancher.example.com
  KUBERNETES_MANAGEMENT_VERSION: v1.30.2
  NGROK_API_KEY: api-key
  NGROK_AUTHTOKEN: auth-token
  NGROK_PATH: ngrok/kubernetes-ingress-controller
  NGROK_REPO_NAME: ngrok
  NGROK_URL: https://charts.ngrok.com
  CERT_MANAGER_PATH: jetstack/cert-manager
  CERT_MANAGER_URL: https://charts.jetstack.io
  CERT_MANAGER_REPO_NAME: jetstack
  RANCHER_REPO_NAME: rancher-latest
  RANCHER_URL: https://releases.rancher.com/server-charts/latest
  RANCHER_PATH: rancher-latest/rancher
  RANCHER_VERSION: v2.9.1
  RANCHER_PASSWORD: rancheradmin
  GITEA_REPO_NAME: gitea-charts
  GITEA_REPO_URL: https://dl.gitea.com/charts/
  GITEA_CHART_NAME: gitea
  GITEA_CHART_VERSION: 10.4.1
  GITEA_USER_NAME: gitea
  GITEA_USER_PWD: password
intervals:
  default/wait-rancher: ["15m", "30s"]
  default/wait-controllers: ["10m", "10s"]
  default/wait-gitea: ["5m", "10s"]
  default/wait-gitea-service: ["5m", "10s"]
  default/wait-gitea-uninstall: ["5m", "10s"]
  default/wait-turtles-uninstall: ["10m", "30s"]
"#;

/// Suite context for `flags`, built without touching the filesystem
pub fn context(flags: ModeFlags, skip_cleanup: bool) -> SuiteContext {
    let suite_flags = SuiteFlags {
        artifacts_folder: PathBuf::from("/tmp/testenv/_artifacts"),
        chart_path: PathBuf::from("/tmp/testenv/rancher-turtles.tgz"),
        skip_cleanup,
        ..Default::default()
    };
    let config = E2EConfig::from_yaml(CONFIG).unwrap();
    let run = RunConfiguration::new(&suite_flags, config, PathBuf::from("/tmp/clusterctl.yaml"));
    SuiteContext::new(run, OperatingMode::select(flags), default_post_upgrade_hooks())
}

pub fn local_tunnel() -> ModeFlags {
    ModeFlags::default()
}

pub fn managed_cloud() -> ModeFlags {
    ModeFlags {
        use_managed_cloud: true,
        ..Default::default()
    }
}

pub fn isolated() -> ModeFlags {
    ModeFlags {
        isolated_networking: true,
        ..Default::default()
    }
}

pub fn existing() -> ModeFlags {
    ModeFlags {
        use_existing_cluster: true,
        ..Default::default()
    }
}

/// Run a whole suite against `world` with the no-op body
pub async fn run(world: &Arc<MockWorld>, ctx: SuiteContext) -> SuiteOutcome {
    run_with_tokens(world, ctx, &CancellationToken::new(), &CancellationToken::new()).await
}

pub async fn run_with_tokens(
    world: &Arc<MockWorld>,
    ctx: SuiteContext,
    cancel: &CancellationToken,
    teardown_cancel: &CancellationToken,
) -> SuiteOutcome {
    SuiteEngine::new(collaborators(world))
        .run(ctx, &NoSpecs, cancel, teardown_cancel)
        .await
}

/// Like [`run`], also returning every emitted event
pub async fn run_collecting_events(
    world: &Arc<MockWorld>,
    ctx: SuiteContext,
) -> (SuiteOutcome, Vec<SuiteEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let outcome = SuiteEngine::new(collaborators(world))
        .with_event_handler(move |event| sink.lock().unwrap().push(event))
        .run(ctx, &NoSpecs, &CancellationToken::new(), &CancellationToken::new())
        .await;
    let events = events.lock().unwrap().clone();
    (outcome, events)
}

/// Recorded state label of `stage`, `pending` if never reached
pub fn stage_label(outcome: &SuiteOutcome, stage: StageId) -> &'static str {
    outcome
        .context
        .record(stage)
        .map(|r| r.state.label())
        .unwrap_or("pending")
}
