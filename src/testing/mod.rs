//! Contract test harness
//!
//! Loads declarative scenario suites, sends one HTTP request per scenario
//! and matches the response against status and JSON body expectations.
//! Per-scenario failures never abort a run; they become results.

mod config;
mod executor;
mod json_path;
mod matcher;
mod report;
mod runner;

pub use config::*;
pub use executor::{
    join_url, preflight, validate_target, CapturedResponse, Executor, HttpExecutor, TransportError,
};
pub use json_path::JsonPath;
pub use matcher::{evaluate, Failure, MatchResult, Outcome};
pub use report::{render_json, render_text, write_report_file};
pub use runner::{ExecutionResult, RunOptions, RunReport, ScenarioRunner};
