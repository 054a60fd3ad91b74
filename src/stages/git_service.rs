//! Git service deployment, exposure selected by operating mode

use crate::collab::{ChartRelease, Collaborators};
use crate::core::context::{GitServiceResult, SuiteContext};
use crate::core::defaults::*;
use crate::core::hooks::DeploymentRef;
use crate::core::stage::StageId;
use crate::error::SuiteError;
use crate::stages::{manifests, require_cluster, wait_for_deployment};
use tokio_util::sync::CancellationToken;
use tracing::info;

const STAGE: StageId = StageId::DeployGitService;

pub struct GitServiceStage<'a> {
    collab: &'a Collaborators,
}

impl<'a> GitServiceStage<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self { collab }
    }

    /// Deploy the Git service and wait for rollout, then for the service
    pub async fn deploy(
        &self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<GitServiceResult, SuiteError> {
        let cluster = require_cluster(ctx, STAGE)?;
        let config = &ctx.config;
        let username = config.require(vars::GITEA_USER_NAME)?;
        let password = config.require(vars::GITEA_USER_PWD)?;
        let repo_name = config.require(vars::GITEA_REPO_NAME)?;
        let exposure = ctx.mode.git_exposure();

        self.collab
            .charts
            .add_repo(cluster, repo_name, config.require(vars::GITEA_REPO_URL)?, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, repo_name, e))?;

        let chart = format!("{}/{}", repo_name, config.require(vars::GITEA_CHART_NAME)?);
        let rollout_wait = ctx.interval(phases::WAIT_GITEA);
        let release = ChartRelease::new(GITEA_RELEASE, chart, GITEA_NAMESPACE, rollout_wait)
            .with_version(config.variable(vars::GITEA_CHART_VERSION).unwrap_or_default())
            .with_values_file(config.gitea_values_path.clone())
            .with_string_value("gitea.admin.username", username)
            .with_string_value("gitea.admin.password", password)
            .with_value("service.http.type", exposure.as_str());

        info!("Deploying gitea exposed as {}", exposure);
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, GITEA_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(GITEA_NAMESPACE, GITEA_DEPLOYMENT),
            rollout_wait,
            cancel,
        )
        .await?;

        let overrides = [(vars::RANCHER_HOSTNAME, ctx.hostname.as_str())];
        if ctx.mode.custom_git_ingress {
            let ingress = manifests::render(manifests::GITEA_INGRESS, &config.variables, &overrides);
            self.collab
                .manifests
                .apply(cluster, &ingress, cancel)
                .await
                .map_err(|e| SuiteError::from_collaborator(STAGE, "gitea ingress", e))?;
        }

        let address = self
            .collab
            .readiness
            .wait_for_service(
                cluster,
                GITEA_NAMESPACE,
                GITEA_HTTP_SERVICE,
                exposure,
                ctx.interval(phases::WAIT_GITEA_SERVICE),
                cancel,
            )
            .await
            .map_err(|e| {
                SuiteError::from_collaborator(
                    STAGE,
                    &format!("service {}/{}", GITEA_NAMESPACE, GITEA_HTTP_SERVICE),
                    e,
                )
            })?;

        let endpoint = if ctx.mode.custom_git_ingress {
            format!("http://gitea.{}", ctx.hostname)
        } else {
            format!("http://{}", address)
        };

        let secret = manifests::basic_auth_secret(AUTH_SECRET_NAME, GITEA_NAMESPACE, username, password)
            .map_err(|e| SuiteError::provisioning(STAGE, format!("{}: {}", AUTH_SECRET_NAME, e)))?;
        self.collab
            .manifests
            .apply(cluster, &secret, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, AUTH_SECRET_NAME, e))?;

        info!("gitea available at {}", endpoint);
        Ok(GitServiceResult {
            endpoint,
            exposure,
            username: username.to_string(),
            auth_secret: AUTH_SECRET_NAME.to_string(),
            namespace: GITEA_NAMESPACE.to_string(),
            release: GITEA_RELEASE.to_string(),
        })
    }
}
