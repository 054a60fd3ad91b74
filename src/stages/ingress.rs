//! Ingress deployment, flavor selected by operating mode

use crate::collab::{ChartRelease, Collaborators};
use crate::core::context::{ClusterHandle, IngressResult, SuiteContext};
use crate::core::defaults::*;
use crate::core::hooks::DeploymentRef;
use crate::core::interval::WaitInterval;
use crate::core::mode::IngressFlavor;
use crate::core::stage::StageId;
use crate::error::SuiteError;
use crate::stages::{manifests, require_cluster, wait_for_deployment};
use tokio_util::sync::CancellationToken;
use tracing::info;

const STAGE: StageId = StageId::DeployIngress;
const EXTRA_VALUES_FILE: &str = "deploy-rancher-ingress.yaml";

pub struct IngressStage<'a> {
    collab: &'a Collaborators,
}

impl<'a> IngressStage<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self { collab }
    }

    /// Deploy the ingress for the current mode and wait until it is ready
    pub async fn deploy(
        &self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<IngressResult, SuiteError> {
        let cluster = require_cluster(ctx, STAGE)?;
        let flavor = ctx.mode.ingress_flavor();
        let interval = ctx.interval(phases::WAIT_RANCHER);
        info!("Deploying {} ingress", flavor.label());

        match flavor {
            IngressFlavor::Tunnel => self.deploy_tunnel(ctx, cluster, interval, cancel).await?,
            IngressFlavor::CloudNative | IngressFlavor::Custom => {
                self.deploy_nginx(ctx, cluster, flavor, interval, cancel).await?
            }
        }

        Ok(IngressResult { flavor })
    }

    async fn deploy_tunnel(
        &self,
        ctx: &SuiteContext,
        cluster: &ClusterHandle,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        let config = &ctx.config;
        let repo_name = config.require(vars::NGROK_REPO_NAME)?;
        let repo_url = config.require(vars::NGROK_URL)?;
        let chart = config.require(vars::NGROK_PATH)?;

        self.collab
            .charts
            .add_repo(cluster, repo_name, repo_url, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, repo_name, e))?;

        let release = ChartRelease::new(TUNNEL_RELEASE, chart, TUNNEL_NAMESPACE, interval)
            .with_string_value("credentials.apiKey", config.require(vars::NGROK_API_KEY)?)
            .with_string_value("credentials.authtoken", config.require(vars::NGROK_AUTHTOKEN)?)
            .with_values_file(config.extra_values(EXTRA_VALUES_FILE));
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, TUNNEL_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(TUNNEL_NAMESPACE, TUNNEL_DEPLOYMENT),
            interval,
            cancel,
        )
        .await?;

        let patch = manifests::render(manifests::NGROK_INGRESS_CLASS, &config.variables, &[]);
        self.collab
            .manifests
            .apply(cluster, &patch, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, "default ingress class", e))
    }

    async fn deploy_nginx(
        &self,
        ctx: &SuiteContext,
        cluster: &ClusterHandle,
        flavor: IngressFlavor,
        interval: WaitInterval,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        self.collab
            .charts
            .add_repo(cluster, NGINX_REPO_NAME, NGINX_REPO_URL, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, NGINX_REPO_NAME, e))?;

        let mut release = ChartRelease::new(NGINX_RELEASE, NGINX_CHART, NGINX_NAMESPACE, interval)
            .with_values_file(ctx.config.extra_values(EXTRA_VALUES_FILE));
        release = match flavor {
            IngressFlavor::Custom => release
                .with_value("controller.hostPort.enabled", "true")
                .with_value("controller.service.type", "NodePort"),
            _ => release.with_value("controller.service.type", "LoadBalancer"),
        };
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, NGINX_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(NGINX_NAMESPACE, NGINX_DEPLOYMENT),
            interval,
            cancel,
        )
        .await?;

        if flavor == IngressFlavor::Custom {
            let class = manifests::render(manifests::NGINX_INGRESS_CLASS, &ctx.config.variables, &[]);
            self.collab
                .manifests
                .apply(cluster, &class, cancel)
                .await
                .map_err(|e| SuiteError::from_collaborator(STAGE, "default ingress class", e))?;
        }
        Ok(())
    }
}
