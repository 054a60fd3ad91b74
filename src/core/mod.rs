//! Core domain models for a suite run
//!
//! Configuration, operating mode, stage identifiers and the state threaded
//! from setup through teardown.

pub mod config;
pub mod context;
pub mod defaults;
pub mod flags;
pub mod hooks;
pub mod interval;
pub mod mode;
pub mod plan;
pub mod resolver;
pub mod stage;
pub mod state;

pub use config::E2EConfig;
pub use context::*;
pub use flags::SuiteFlags;
pub use hooks::{default_post_upgrade_hooks, DeploymentRef, VerificationHook};
pub use interval::WaitInterval;
pub use mode::*;
pub use plan::SuitePlan;
pub use resolver::{ConfigResolver, RunConfiguration};
pub use stage::*;
pub use state::*;
