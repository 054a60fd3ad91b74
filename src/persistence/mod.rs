//! Persistence layer for suite run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::stage::StageId;
use crate::core::state::SuiteStatus;
use crate::execution::SuiteOutcome;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final state of one stage in a past run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: StageId,
    pub state: String,
    pub error: Option<String>,
}

/// Summary of a finished suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// When setup started
    pub started_at: DateTime<Utc>,

    /// When teardown finished
    pub finished_at: Option<DateTime<Utc>>,

    /// Operating mode label, e.g. `local/tunnel`
    pub mode: String,

    pub status: SuiteStatus,

    /// Process exit code the run produced
    pub exit_code: i32,

    /// Every stage the run reached, in execution order
    pub stages: Vec<StageSummary>,

    /// Errors reported by teardown steps
    pub teardown_errors: Vec<String>,
}

impl RunSummary {
    /// Create a summary from a finished run
    pub fn from_outcome(outcome: &SuiteOutcome) -> Self {
        let ctx = &outcome.context;
        Self {
            run_id: ctx.state.run_id,
            started_at: ctx.state.started_at.unwrap_or_else(Utc::now),
            finished_at: ctx.state.completed_at,
            mode: ctx.mode.label(),
            status: outcome.status(),
            exit_code: outcome.exit_code(),
            stages: ctx
                .records
                .iter()
                .map(|r| StageSummary {
                    stage: r.stage,
                    state: r.state.label().to_string(),
                    error: r.state.error().map(str::to_string),
                })
                .collect(),
            teardown_errors: outcome
                .teardown
                .errors()
                .map(|(stage, e)| format!("{}: {}", stage, e))
                .collect(),
        }
    }

    /// First failed stage, if any
    pub fn failed_stage(&self) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.error.is_some())
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List the most recent runs, newest first
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<Vec<RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.retain(|r| r.run_id != run.run_id);
        runs.push(run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs.clone();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }
}
