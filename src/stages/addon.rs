//! Orchestration add-on: install, chart registry and verified upgrade

use crate::collab::{ChartRelease, Collaborators};
use crate::core::context::SuiteContext;
use crate::core::defaults::*;
use crate::core::hooks::{DeploymentRef, VerificationHook};
use crate::core::stage::StageId;
use crate::core::state::AddOnState;
use crate::error::{ErrorKind, SuiteError};
use crate::stages::{manifests, require_cluster, wait_for_deployment};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const EXTRA_VALUES_FILE: &str = "deploy-rancher-turtles.yaml";
const CHART_REGISTRY_REPO: &str = "chartmuseum-local";

/// Helm values threaded from install into upgrade
///
/// Passed by value at each hand-off; nothing else holds on to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalValues(BTreeMap<String, String>);

impl AdditionalValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values the upgrade to the locally built image needs
    pub fn with_upgrade_overrides(mut self) -> Self {
        // the image is side-loaded, never pulled
        self.set("rancherTurtles.imagePullPolicy", "Never");
        self.set("rancherTurtles.features.addon-provider-fleet.enabled", "true");
        // disable the default management v3 cluster controller
        self.set("rancherTurtles.features.managementv3-cluster.enabled", "false");
        self
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Drives the add-on through `NotInstalled -> Installed -> Upgrading -> Upgraded`
pub struct AddOnStage<'a> {
    collab: &'a Collaborators,
    state: AddOnState,
}

impl<'a> AddOnStage<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self::with_state(collab, AddOnState::NotInstalled)
    }

    pub fn with_state(collab: &'a Collaborators, state: AddOnState) -> Self {
        Self { collab, state }
    }

    pub fn state(&self) -> AddOnState {
        self.state
    }

    /// Install the baseline release with empty additional values
    pub async fn install(
        &mut self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<AdditionalValues, SuiteError> {
        const STAGE: StageId = StageId::InstallAddOn;
        if self.state != AddOnState::NotInstalled {
            return Err(SuiteError::InvalidTransition {
                from: self.state,
                to: AddOnState::Installed,
            });
        }
        let cluster = require_cluster(ctx, STAGE)?;
        let interval = ctx.interval(phases::WAIT_CONTROLLERS);
        let values = AdditionalValues::new();

        self.collab
            .charts
            .add_repo(cluster, TURTLES_REPO_NAME, TURTLES_REPO_URL, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, TURTLES_REPO_NAME, e))?;

        let release = ChartRelease::new(TURTLES_RELEASE, TURTLES_CHART, TURTLES_NAMESPACE, interval)
            .with_version(TURTLES_BASELINE_VERSION)
            .with_values(values.clone().into_inner())
            .with_values_file(ctx.config.extra_values(EXTRA_VALUES_FILE));

        info!("Installing rancher-turtles {}", TURTLES_BASELINE_VERSION);
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, TURTLES_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(TURTLES_NAMESPACE, TURTLES_DEPLOYMENT),
            interval,
            cancel,
        )
        .await?;

        let providers = manifests::render(manifests::CAPI_PROVIDERS, &ctx.config.variables, &[]);
        self.collab
            .manifests
            .apply(cluster, &providers, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, "CAPI providers", e))?;

        self.state.advance(AddOnState::Installed)?;
        Ok(values)
    }

    /// Deploy the chart registry and push the local chart into it
    pub async fn deploy_registry(
        &self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        const STAGE: StageId = StageId::DeployChartRegistry;
        let cluster = require_cluster(ctx, STAGE)?;
        let interval = ctx.interval(phases::WAIT_CONTROLLERS);

        self.collab
            .charts
            .add_repo(cluster, CHARTMUSEUM_REPO_NAME, CHARTMUSEUM_REPO_URL, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, CHARTMUSEUM_REPO_NAME, e))?;

        let release = ChartRelease::new(
            CHARTMUSEUM_RELEASE,
            CHARTMUSEUM_CHART,
            CHARTMUSEUM_NAMESPACE,
            interval,
        )
        .with_value("env.open.DISABLE_API", "false");

        info!("Deploying chartmuseum");
        self.collab
            .charts
            .install(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, CHARTMUSEUM_RELEASE, e))?;

        wait_for_deployment(
            self.collab,
            STAGE,
            cluster,
            &DeploymentRef::new(CHARTMUSEUM_NAMESPACE, CHARTMUSEUM_DEPLOYMENT),
            interval,
            cancel,
        )
        .await?;

        self.collab
            .charts
            .add_repo(cluster, CHART_REGISTRY_REPO, CHARTMUSEUM_URL, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, CHART_REGISTRY_REPO, e))?;
        self.collab
            .charts
            .push_chart(cluster, &ctx.config.chart_path, CHART_REGISTRY_REPO, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, "chart push", e))
    }

    /// Upgrade to the locally built image and run every verification hook
    ///
    /// The state only becomes `Upgraded` once all hooks passed; a failing hook
    /// leaves it at `Upgrading`.
    pub async fn upgrade(
        &mut self,
        ctx: &SuiteContext,
        values: AdditionalValues,
        cancel: &CancellationToken,
    ) -> Result<AdditionalValues, SuiteError> {
        const STAGE: StageId = StageId::UpgradeAddOn;
        let cluster = require_cluster(ctx, STAGE)?;
        self.state.advance(AddOnState::Upgrading)?;

        let values = values.with_upgrade_overrides();
        let interval = ctx.interval(phases::WAIT_CONTROLLERS);
        let image = upgrade_image();
        let release = ChartRelease::new(
            TURTLES_RELEASE,
            ctx.config.chart_path.display().to_string(),
            TURTLES_NAMESPACE,
            interval,
        )
        .with_value("rancherTurtles.image", image.as_str())
        .with_value("rancherTurtles.imageVersion", TURTLES_IMAGE_TAG)
        .with_values(values.clone().into_inner());

        info!("Upgrading rancher-turtles to {}:{}", image, TURTLES_IMAGE_TAG);
        self.collab
            .charts
            .upgrade(cluster, &release, cancel)
            .await
            .map_err(|e| SuiteError::from_collaborator(STAGE, TURTLES_RELEASE, e))?;

        for hook in &ctx.post_upgrade_hooks {
            self.verify(ctx, hook, cancel).await?;
        }

        self.state.advance(AddOnState::Upgraded)?;
        info!("rancher-turtles upgrade verified");
        Ok(values)
    }

    async fn verify(
        &self,
        ctx: &SuiteContext,
        hook: &VerificationHook,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        const STAGE: StageId = StageId::UpgradeAddOn;
        let cluster = require_cluster(ctx, STAGE)?;
        info!("Verifying {}", hook.name());

        let interval = ctx.interval(hook.phase());
        let result = match hook {
            VerificationHook::DeploymentAvailable { deployment, .. } => {
                wait_for_deployment(self.collab, STAGE, cluster, deployment, interval, cancel).await
            }
        };

        result.map_err(|e| match e.kind() {
            ErrorKind::Cancelled => e,
            _ => {
                error!("Verification {} failed: {}", hook.name(), e);
                SuiteError::Verification {
                    hook: hook.name(),
                    message: e.to_string(),
                }
            }
        })
    }
}
