//! Execution state models

use crate::error::SuiteError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall suite run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuiteStatus {
    /// Suite has not started
    Pending,
    /// Setup, specs or teardown in progress
    Running,
    /// Every phase succeeded
    Completed,
    /// Setup or teardown failed
    Failed,
    /// Setup observed external cancellation
    Cancelled,
}

/// State of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageState {
    /// Stage has not been reached
    Pending,
    /// Stage is currently running
    Running { started_at: DateTime<Utc> },
    /// Stage completed successfully
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Stage failed; the suite stops moving forward
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Stage intentionally not run (e.g. cluster cleanup under skip-cleanup)
    Skipped { reason: String },
}

impl StageState {
    pub fn label(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running { .. } => "running",
            StageState::Completed { .. } => "completed",
            StageState::Failed { .. } => "failed",
            StageState::Skipped { .. } => "skipped",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StageState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Lifecycle of the orchestration add-on across install and upgrade
///
/// `NotInstalled -> Installed -> Upgrading -> Upgraded`. No transition skips a
/// state, and `Upgraded` is only reachable once every verification hook passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddOnState {
    NotInstalled,
    Installed,
    Upgrading,
    Upgraded,
}

impl AddOnState {
    fn successor(self) -> Option<AddOnState> {
        match self {
            AddOnState::NotInstalled => Some(AddOnState::Installed),
            AddOnState::Installed => Some(AddOnState::Upgrading),
            AddOnState::Upgrading => Some(AddOnState::Upgraded),
            AddOnState::Upgraded => None,
        }
    }

    /// Move to `next`, rejecting anything but the immediate successor
    pub fn advance(&mut self, next: AddOnState) -> Result<(), SuiteError> {
        if self.successor() != Some(next) {
            return Err(SuiteError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl Default for AddOnState {
    fn default() -> Self {
        AddOnState::NotInstalled
    }
}

impl fmt::Display for AddOnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AddOnState::NotInstalled => "not-installed",
            AddOnState::Installed => "installed",
            AddOnState::Upgrading => "upgrading",
            AddOnState::Upgraded => "upgraded",
        };
        f.write_str(label)
    }
}

/// Overall suite state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current run status
    pub status: SuiteStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When teardown finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl SuiteState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: SuiteStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = SuiteStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark run as finished with the given status
    pub fn finish(&mut self, status: SuiteStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

impl Default for SuiteState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addon_walks_every_state_in_order() {
        let mut state = AddOnState::default();
        state.advance(AddOnState::Installed).unwrap();
        state.advance(AddOnState::Upgrading).unwrap();
        state.advance(AddOnState::Upgraded).unwrap();
        assert_eq!(state, AddOnState::Upgraded);
    }

    #[test]
    fn test_addon_cannot_skip_states() {
        let mut state = AddOnState::NotInstalled;
        let err = state.advance(AddOnState::Upgrading).unwrap_err();
        assert!(matches!(err, SuiteError::InvalidTransition { .. }));
        assert_eq!(state, AddOnState::NotInstalled);

        let mut state = AddOnState::Installed;
        assert!(state.advance(AddOnState::Upgraded).is_err());
        assert_eq!(state, AddOnState::Installed);
    }

    #[test]
    fn test_upgraded_is_final() {
        let mut state = AddOnState::Upgraded;
        assert!(state.advance(AddOnState::NotInstalled).is_err());
    }

    #[test]
    fn test_suite_state_finish() {
        let mut state = SuiteState::new();
        state.start();
        assert_eq!(state.status, SuiteStatus::Running);
        state.finish(SuiteStatus::Failed);
        assert_eq!(state.status, SuiteStatus::Failed);
        assert!(state.completed_at.is_some());
    }
}
