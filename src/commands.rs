//! CLI command definitions
//!
//! Defines the clap commands for the probe CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::config::{parse_duration, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario suite against a target
    Run(RunArgs),

    /// Load and validate a suite without sending any request
    Validate {
        /// Path to the YAML or JSON suite file
        #[arg(long, short)]
        suite: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Base URL of the system under test, e.g. http://localhost:8080
    #[arg(long, short)]
    pub target: String,

    /// Path to the YAML or JSON suite file
    #[arg(long, short)]
    pub suite: PathBuf,

    /// Maximum number of requests in flight, 1 to 256 (default: 1, sequential)
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Per-request timeout, e.g. 500ms, 10s, 1m (default: 30s)
    #[arg(long, value_parser = parse_duration_arg)]
    pub timeout: Option<Duration>,

    /// Abort scenarios still running after this long
    #[arg(long, value_parser = parse_duration_arg)]
    pub run_timeout: Option<Duration>,

    /// Report format written to stdout
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Only run scenarios whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Extra header for every scenario, as 'Name: value'
    /// Can be specified multiple times: --header 'RequestID: abc' --header 'X-Env: dev'
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Check that the target accepts TCP connections before running
    #[arg(long)]
    pub preflight: bool,
}

fn parse_duration_arg(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}
