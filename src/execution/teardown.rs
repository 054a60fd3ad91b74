//! Teardown that runs whatever happened during setup

use crate::collab::Collaborators;
use crate::core::context::SuiteContext;
use crate::core::defaults::*;
use crate::core::stage::StageId;
use crate::core::state::StageState;
use crate::error::SuiteError;
use crate::execution::engine::SuiteEvent;
use crate::stages::{ClusterCleanup, ClusterProvisioner};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one teardown step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownStep {
    pub stage: StageId,
    pub state: StageState,
}

/// Result of a teardown, every step included
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    /// True if no step failed
    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Failed steps and their errors
    pub fn errors(&self) -> impl Iterator<Item = (StageId, &str)> + '_ {
        self.steps
            .iter()
            .filter_map(|s| s.state.error().map(|e| (s.stage, e)))
    }

    pub fn step(&self, stage: StageId) -> Option<&TeardownStep> {
        self.steps.iter().find(|s| s.stage == stage)
    }
}

/// Uninstalls the Git service, then the add-on, then removes the cluster
///
/// Every step is attempted even if an earlier one failed. Errors are
/// collected in the report and never abort the teardown.
pub struct TeardownOrchestrator<'a> {
    collab: &'a Collaborators,
}

impl<'a> TeardownOrchestrator<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self { collab }
    }

    pub async fn run(
        &self,
        ctx: &SuiteContext,
        cancel: &CancellationToken,
        emit: &(dyn Fn(SuiteEvent) + Send + Sync),
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        let Some(cluster) = &ctx.cluster else {
            info!("No cluster was provisioned, nothing to tear down");
            for stage in StageId::TEARDOWN {
                let reason = "no cluster was provisioned".to_string();
                emit(SuiteEvent::StageSkipped {
                    stage,
                    reason: reason.clone(),
                });
                report.steps.push(TeardownStep {
                    stage,
                    state: StageState::Skipped { reason },
                });
            }
            return report;
        };

        for stage in StageId::TEARDOWN {
            emit(SuiteEvent::StageStarted { stage });
            let started_at = Utc::now();

            let result = match stage {
                StageId::UninstallGitService => {
                    let release = ctx
                        .git
                        .as_ref()
                        .map(|g| g.release.as_str())
                        .unwrap_or(GITEA_RELEASE);
                    let namespace = ctx
                        .git
                        .as_ref()
                        .map(|g| g.namespace.as_str())
                        .unwrap_or(GITEA_NAMESPACE);
                    self.collab
                        .charts
                        .uninstall(
                            cluster,
                            release,
                            namespace,
                            ctx.interval(phases::WAIT_GITEA_UNINSTALL),
                            cancel,
                        )
                        .await
                        .map(|_| None)
                        .map_err(|e| SuiteError::from_collaborator(stage, release, e))
                }
                StageId::UninstallAddOn => self
                    .collab
                    .charts
                    .uninstall(
                        cluster,
                        TURTLES_RELEASE,
                        TURTLES_NAMESPACE,
                        ctx.interval(phases::WAIT_TURTLES_UNINSTALL),
                        cancel,
                    )
                    .await
                    .map(|_| None)
                    .map_err(|e| SuiteError::from_collaborator(stage, TURTLES_RELEASE, e)),
                StageId::CleanupCluster => ClusterProvisioner::new(self.collab)
                    .cleanup(cluster, ctx.config.skip_cleanup, cancel)
                    .await
                    .map(|cleanup| match cleanup {
                        ClusterCleanup::Skipped => Some("skip-cleanup is set".to_string()),
                        ClusterCleanup::Deleted | ClusterCleanup::Detached => None,
                    }),
                other => unreachable!("{} is not a teardown step", other),
            };

            let state = match result {
                Ok(None) => {
                    emit(SuiteEvent::StageCompleted { stage });
                    StageState::Completed {
                        started_at,
                        completed_at: Utc::now(),
                    }
                }
                Ok(Some(reason)) => {
                    warn!("{} skipped: {}", stage, reason);
                    emit(SuiteEvent::StageSkipped {
                        stage,
                        reason: reason.clone(),
                    });
                    StageState::Skipped { reason }
                }
                Err(e) => {
                    error!("{} failed: {}", stage, e);
                    emit(SuiteEvent::StageFailed {
                        stage,
                        error: e.to_string(),
                    });
                    StageState::Failed {
                        error: e.to_string(),
                        started_at,
                        failed_at: Utc::now(),
                    }
                }
            };
            report.steps.push(TeardownStep { stage, state });
        }

        report
    }
}
