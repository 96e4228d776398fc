//! Error types for the probe CLI
//!
//! Only harness-level failures live here. Anything that goes wrong while a
//! single scenario runs is folded into that scenario's result instead.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the probe CLI
#[derive(Error, Debug)]
pub enum Error {
    // === Suite Errors ===
    #[error("Failed to read suite '{path}': {error}")]
    SuiteRead { path: String, error: String },

    #[error("Failed to parse suite '{path}': {error}")]
    SuiteParse { path: String, error: String },

    #[error("Suite '{path}' is invalid:\n  - {}", .problems.join("\n  - "))]
    SuiteInvalid { path: String, problems: Vec<String> },

    #[error("No scenarios left to run after applying filter '{0}'")]
    EmptySelection(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid duration '{0}'. Use a number with an optional ms, s or m suffix")]
    InvalidDuration(String),

    #[error("Target {target} is unreachable: {reason}")]
    Preflight { target: String, reason: String },

    // === IO Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a suite validation error from the collected problems
    pub fn suite_invalid(path: &str, problems: Vec<String>) -> Self {
        Self::SuiteInvalid {
            path: path.to_string(),
            problems,
        }
    }

    /// Create a preflight failure error
    pub fn preflight(target: &str, reason: impl ToString) -> Self {
        Self::Preflight {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for a harness-level failure
    ///
    /// Every error that escapes the harness is a configuration problem as
    /// far as the caller is concerned; scenario failures never reach here.
    pub fn exit_code(&self) -> i32 {
        2
    }
}
