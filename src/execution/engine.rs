//! Suite engine - runs setup, the suite body and teardown

use crate::collab::Collaborators;
use crate::core::context::SuiteContext;
use crate::core::defaults::vars;
use crate::core::stage::StageId;
use crate::core::state::{StageState, SuiteStatus};
use crate::error::{ErrorKind, SuiteError};
use crate::execution::body::SuiteBody;
use crate::execution::teardown::{TeardownOrchestrator, TeardownReport};
use crate::stages::{AddOnStage, ClusterProvisioner, GitServiceStage, IngressStage, PlatformStage};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a suite run
#[derive(Debug, Clone)]
pub enum SuiteEvent {
    SuiteStarted {
        run_id: Uuid,
        mode: String,
    },
    StageStarted {
        stage: StageId,
    },
    StageCompleted {
        stage: StageId,
    },
    StageFailed {
        stage: StageId,
        error: String,
    },
    StageSkipped {
        stage: StageId,
        reason: String,
    },
    SuiteCompleted {
        run_id: Uuid,
        status: SuiteStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(SuiteEvent) + Send + Sync>;

/// Everything a finished run produced
#[derive(Debug)]
pub struct SuiteOutcome {
    pub context: SuiteContext,
    pub setup_error: Option<SuiteError>,
    pub body_error: Option<String>,
    pub teardown: TeardownReport,
}

impl SuiteOutcome {
    pub fn status(&self) -> SuiteStatus {
        match &self.setup_error {
            Some(e) if e.kind() == ErrorKind::Cancelled => SuiteStatus::Cancelled,
            Some(_) => SuiteStatus::Failed,
            None if self.body_error.is_some() || !self.teardown.is_clean() => SuiteStatus::Failed,
            None => SuiteStatus::Completed,
        }
    }

    /// Process exit code
    ///
    /// Setup failures win over teardown errors, which win over a failing body.
    pub fn exit_code(&self) -> i32 {
        if self.setup_error.is_some() {
            2
        } else if !self.teardown.is_clean() {
            3
        } else if self.body_error.is_some() {
            1
        } else {
            0
        }
    }
}

/// Sequential suite engine
pub struct SuiteEngine {
    collab: Collaborators,
    event_handlers: Vec<EventHandler>,
}

impl SuiteEngine {
    pub fn new(collab: Collaborators) -> Self {
        Self {
            collab,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(SuiteEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    /// Emit an event to all handlers
    fn emit(&self, event: SuiteEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run setup, the body if setup succeeded, then teardown
    ///
    /// Teardown always runs and observes its own token, so cancelling setup
    /// does not stop the cleanup.
    pub async fn run(
        &self,
        mut ctx: SuiteContext,
        body: &dyn SuiteBody,
        cancel: &CancellationToken,
        teardown_cancel: &CancellationToken,
    ) -> SuiteOutcome {
        let run_id = ctx.state.run_id;
        info!("Starting suite run {} ({})", run_id, ctx.mode.label());
        self.emit(SuiteEvent::SuiteStarted {
            run_id,
            mode: ctx.mode.label(),
        });
        ctx.state.start();

        let setup_error = self.setup(&mut ctx, cancel).await.err();
        if let Some(e) = &setup_error {
            error!("Setup failed: {}", e);
        }

        let body_error = if setup_error.is_none() {
            self.run_body(&mut ctx, body, cancel).await
        } else {
            None
        };

        let teardown = self.teardown(&mut ctx, teardown_cancel).await;

        let mut outcome = SuiteOutcome {
            context: ctx,
            setup_error,
            body_error,
            teardown,
        };
        let status = outcome.status();
        outcome.context.state.finish(status);
        info!("Suite run {} finished: {:?}", run_id, status);
        self.emit(SuiteEvent::SuiteCompleted { run_id, status });
        outcome
    }

    /// Run every setup stage in order, stopping at the first failure
    pub async fn setup(
        &self,
        ctx: &mut SuiteContext,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        let kubernetes_version = ctx
            .config
            .variable(vars::KUBERNETES_MANAGEMENT_VERSION)
            .unwrap_or_default()
            .to_string();

        self.begin(ctx, StageId::ProvisionCluster, cancel)?;
        let result = ClusterProvisioner::new(&self.collab)
            .provision(&ctx.config, &ctx.mode, &kubernetes_version, cancel)
            .await;
        ctx.cluster = Some(self.finish(ctx, StageId::ProvisionCluster, result)?);

        self.begin(ctx, StageId::DeployIngress, cancel)?;
        let result = IngressStage::new(&self.collab).deploy(ctx, cancel).await;
        ctx.ingress = Some(self.finish(ctx, StageId::DeployIngress, result)?);

        self.begin(ctx, StageId::DeployPlatform, cancel)?;
        let result = PlatformStage::new(&self.collab).deploy(ctx, cancel).await;
        let platform = self.finish(ctx, StageId::DeployPlatform, result)?;
        ctx.hostname = platform.hostname.clone();
        ctx.platform = Some(platform);

        let mut addon = AddOnStage::with_state(&self.collab, ctx.addon);

        self.begin(ctx, StageId::InstallAddOn, cancel)?;
        let result = addon.install(ctx, cancel).await;
        ctx.addon = addon.state();
        let values = self.finish(ctx, StageId::InstallAddOn, result)?;

        self.begin(ctx, StageId::DeployChartRegistry, cancel)?;
        let result = addon.deploy_registry(ctx, cancel).await;
        self.finish(ctx, StageId::DeployChartRegistry, result)?;

        self.begin(ctx, StageId::UpgradeAddOn, cancel)?;
        let result = addon.upgrade(ctx, values, cancel).await;
        ctx.addon = addon.state();
        self.finish(ctx, StageId::UpgradeAddOn, result)?;

        self.begin(ctx, StageId::DeployGitService, cancel)?;
        let result = GitServiceStage::new(&self.collab).deploy(ctx, cancel).await;
        ctx.git = Some(self.finish(ctx, StageId::DeployGitService, result)?);

        info!("Setup complete");
        Ok(())
    }

    /// Tear down whatever setup reached and record every step
    pub async fn teardown(
        &self,
        ctx: &mut SuiteContext,
        cancel: &CancellationToken,
    ) -> TeardownReport {
        info!("Tearing down");
        let emit = |event: SuiteEvent| self.emit(event);
        let report = TeardownOrchestrator::new(&self.collab)
            .run(ctx, cancel, &emit)
            .await;
        for step in &report.steps {
            ctx.record_mut(step.stage).state = step.state.clone();
        }
        for (stage, e) in report.errors() {
            warn!("Teardown step {} reported: {}", stage, e);
        }
        report
    }

    async fn run_body(
        &self,
        ctx: &mut SuiteContext,
        body: &dyn SuiteBody,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let started_at = Utc::now();
        ctx.record_mut(StageId::RunSpecs).state = StageState::Running { started_at };
        self.emit(SuiteEvent::StageStarted {
            stage: StageId::RunSpecs,
        });

        match body.run(ctx, cancel).await {
            Ok(()) => {
                ctx.record_mut(StageId::RunSpecs).state = StageState::Completed {
                    started_at,
                    completed_at: Utc::now(),
                };
                self.emit(SuiteEvent::StageCompleted {
                    stage: StageId::RunSpecs,
                });
                None
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Specs failed: {}", message);
                ctx.record_mut(StageId::RunSpecs).state = StageState::Failed {
                    error: message.clone(),
                    started_at,
                    failed_at: Utc::now(),
                };
                self.emit(SuiteEvent::StageFailed {
                    stage: StageId::RunSpecs,
                    error: message.clone(),
                });
                Some(message)
            }
        }
    }

    /// Mark a stage running, refusing to start once cancellation was requested
    fn begin(
        &self,
        ctx: &mut SuiteContext,
        stage: StageId,
        cancel: &CancellationToken,
    ) -> Result<(), SuiteError> {
        if cancel.is_cancelled() {
            let err = SuiteError::Cancelled { stage };
            ctx.record_mut(stage).state = StageState::Failed {
                error: err.to_string(),
                started_at: Utc::now(),
                failed_at: Utc::now(),
            };
            self.emit(SuiteEvent::StageFailed {
                stage,
                error: err.to_string(),
            });
            return Err(err);
        }

        info!("Stage {} started", stage);
        ctx.record_mut(stage).state = StageState::Running {
            started_at: Utc::now(),
        };
        self.emit(SuiteEvent::StageStarted { stage });
        Ok(())
    }

    /// Record the stage result and pass it through
    fn finish<T>(
        &self,
        ctx: &mut SuiteContext,
        stage: StageId,
        result: Result<T, SuiteError>,
    ) -> Result<T, SuiteError> {
        let record = ctx.record_mut(stage);
        let started_at = match record.state {
            StageState::Running { started_at } => started_at,
            _ => Utc::now(),
        };

        match &result {
            Ok(_) => {
                info!("Stage {} completed", stage);
                record.state = StageState::Completed {
                    started_at,
                    completed_at: Utc::now(),
                };
                self.emit(SuiteEvent::StageCompleted { stage });
            }
            Err(e) => {
                error!("Stage {} failed: {}", stage, e);
                record.state = StageState::Failed {
                    error: e.to_string(),
                    started_at,
                    failed_at: Utc::now(),
                };
                self.emit(SuiteEvent::StageFailed {
                    stage,
                    error: e.to_string(),
                });
            }
        }
        result
    }
}
