//! Setup stages, one module per stage

pub mod addon;
pub mod cluster;
pub mod git_service;
pub mod ingress;
pub mod manifests;
pub mod platform;

use crate::collab::Collaborators;
use crate::core::context::{ClusterHandle, SuiteContext};
use crate::core::hooks::DeploymentRef;
use crate::core::interval::WaitInterval;
use crate::core::stage::StageId;
use crate::error::SuiteError;
use tokio_util::sync::CancellationToken;

pub use addon::{AdditionalValues, AddOnStage};
pub use cluster::{ClusterCleanup, ClusterProvisioner};
pub use git_service::GitServiceStage;
pub use ingress::IngressStage;
pub use platform::PlatformStage;

/// Cluster handle every stage after provisioning relies on
pub(crate) fn require_cluster(ctx: &SuiteContext, stage: StageId) -> Result<&ClusterHandle, SuiteError> {
    ctx.cluster
        .as_ref()
        .ok_or_else(|| SuiteError::provisioning(stage, "bootstrap cluster is not provisioned"))
}

pub(crate) async fn wait_for_deployment(
    collab: &Collaborators,
    stage: StageId,
    cluster: &ClusterHandle,
    deployment: &DeploymentRef,
    interval: WaitInterval,
    cancel: &CancellationToken,
) -> Result<(), SuiteError> {
    collab
        .readiness
        .wait_for_deployment_available(cluster, deployment, interval, cancel)
        .await
        .map_err(|e| SuiteError::from_collaborator(stage, &deployment.to_string(), e))
}
