//! Suite execution: setup stages, suite body and teardown

pub mod body;
pub mod engine;
pub mod teardown;

pub use body::{NoSpecs, SpecCommand, SuiteBody};
pub use engine::{EventHandler, SuiteEngine, SuiteEvent, SuiteOutcome};
pub use teardown::{TeardownOrchestrator, TeardownReport, TeardownStep};
