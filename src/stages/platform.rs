//! Certificate manager and management platform deployment

use crate::collab::{ChartRelease, Collaborators};
use crate::core::context::{ClusterHandle, PlatformResult, SuiteContext};
use crate::core::defaults::*;
use crate::core::hooks::DeploymentRef;
use crate::core::interval::WaitInterval;
use crate::core::stage::StageId;
use crate::error::SuiteError;
use crate::stages::{manifests, require_cluster, wait_for_deployment};
use tokio_util::sync::CancellationToken;
use tracing::info;

const STAGE: StageId = StageId::DeployPlatform;
const EXTRA_VALUES_FILE: &str = "deploy-rancher.yaml";

pub struct PlatformStage<'a> {
    collab: &'a Collaborators,
}

impl<'a> PlatformStage<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self { collab }
    }

    /// Hostname the platform is deployed under
    ///
    /// Isolated mode always uses the hostname derived from the cluster node,
    /// every other mode the configured one.
    pub fn resolve_hostname(ctx: &SuiteContext, cluster: &ClusterHandle) -> Result<String, SuiteError> {
        if ctx.mode.is_isolated() {
            return cluster.isolated_hostname.clone().ok_or_else(|| {
                SuiteError::precondition(format!(
                    "no hostname was derived for isolated cluster {}",
                    cluster.name
                ))
            });
        }
        if ctx.hostname.is_empty() {
            return Err(SuiteError::precondition(format!(
                "variable {} is not set",
                vars::RANCHER_HOSTNAME
            )));
        }
        Ok(ctx.hostname.clone())
    }

    /// Deploy cert-manager, then the platform, then the mode-specific patches
    pub async fn deploy(
        &self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<PlatformResult, SuiteError> {
        let cluster = require_cluster(ctx, STAGE)?;
        let hostname = Self::resolve_hostname(ctx, cluster)?;
        let rancher_wait = ctx.interval(phases::WAIT_RANCHER);
        let controllers_wait = ctx.interval(phases::WAIT_CONTROLLERS);

        self.deploy_cert_manager(ctx, cluster, controllers_wait, cancel).await?;

        let config = &ctx.config;
        let repo_name = config.require(vars::RANCHER_REPO_NAME)?;
        self.collab
            .charts
            .add_repo(cluster, repo_name, config.require(vars::RANCHER_URL)?, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, repo_name, e))?;

        let patches = ctx.mode.applies_platform_patches();
        let mut release = ChartRelease::new(
            RANCHER_RELEASE,
            config.require(vars::RANCHER_PATH)?,
            RANCHER_NAMESPACE,
            rancher_wait,
        )
        .with_version(config.variable(vars::RANCHER_VERSION).unwrap_or_default())
        .with_value("hostname", hostname.as_str())
        .with_string_value("bootstrapPassword", config.require(vars::RANCHER_PASSWORD)?)
        .with_value("replicas", "1")
        .with_values_file(config.extra_values(EXTRA_VALUES_FILE));
        if patches {
            // exposed through the tunnel ingress applied below
            release = release.with_value("ingress.enabled", "false");
        }

        info!("Deploying rancher on {}", hostname);
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, RANCHER_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(RANCHER_NAMESPACE, RANCHER_DEPLOYMENT),
            rancher_wait,
            cancel,
        )
        .await?;
        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(RANCHER_NAMESPACE, RANCHER_WEBHOOK_DEPLOYMENT),
            controllers_wait,
            cancel,
        )
        .await?;

        let overrides = [(vars::RANCHER_HOSTNAME, hostname.as_str())];
        let mut documents = vec![("server-url setting", manifests::RANCHER_SETTING_PATCH)];
        if patches {
            info!("Applying rancher ingress and service patches");
            documents.push(("rancher ingress", manifests::RANCHER_INGRESS));
            documents.push(("rancher service patch", manifests::RANCHER_SERVICE_PATCH));
        }
        for (target, template) in documents {
            let manifest = manifests::render(template, &config.variables, &overrides);
            self.collab
                .manifests
                .apply(cluster, &manifest, cancel)
                .await
                .map_err(|e| SuiteError::from_collaborator(STAGE, target, e))?;
        }

        Ok(PlatformResult {
            hostname,
            patches_applied: patches,
        })
    }

    async fn deploy_cert_manager(
        &self,
        ctx: &SuiteContext,
        cluster: &ClusterHandle,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        let config = &ctx.config;
        let repo_name = config.require(vars::CERT_MANAGER_REPO_NAME)?;
        self.collab
            .charts
            .add_repo(cluster, repo_name, config.require(vars::CERT_MANAGER_URL)?, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, repo_name, e))?;

        let release = ChartRelease::new(
            CERT_MANAGER_RELEASE,
            config.require(vars::CERT_MANAGER_PATH)?,
            CERT_MANAGER_NAMESPACE,
            interval,
        )
        .with_value("crds.enabled", "true");

        info!("Deploying cert-manager");
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, CERT_MANAGER_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(CERT_MANAGER_NAMESPACE, CERT_MANAGER_DEPLOYMENT),
            interval,
            cancel,
        )
        .await
    }
}
