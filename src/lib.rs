//! testenv - lifecycle orchestrator for disposable e2e test environments

pub mod cli;
pub mod collab;
pub mod core;
pub mod error;
pub mod execution;
pub mod persistence;
pub mod stages;

// Re-export commonly used types
pub use collab::{Collaborators, CollaboratorError};
pub use core::{ConfigResolver, OperatingMode, RunConfiguration, SuiteContext, SuitePlan};
pub use error::{ErrorKind, SuiteError};
pub use execution::{SuiteEngine, SuiteEvent, SuiteOutcome};
