//! probe - declarative HTTP contract testing
//!
//! This library loads scenario suites, executes them against an HTTP
//! target and renders pass/fail reports with expected-versus-actual detail.

pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use testing::{RunReport, ScenarioRunner, Suite};
