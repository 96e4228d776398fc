//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Run settings
    #[serde(default)]
    pub run: RunDefaults,

    /// Extra headers sent with every scenario unless it opts out
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Report rendering format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Colored human-readable summary
    #[default]
    Text,
    /// One JSON object per run
    Json,
}

/// Run settings
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunDefaults {
    /// Maximum number of in-flight requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whole-run timeout in milliseconds, unlimited when absent
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,

    /// Report format when `--format` is not given
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_ms: default_timeout_ms(),
            run_timeout_ms: None,
            format: OutputFormat::default(),
        }
    }
}

/// Upper bound on `concurrency`, from the config file or `--concurrency`
pub const MAX_CONCURRENCY: usize = 256;

fn default_concurrency() -> usize {
    1
}
fn default_timeout_ms() -> u64 {
    30_000
}

impl Config {
    /// Load configuration from an explicit path or the default config file
    ///
    /// Returns default configuration if the default file doesn't exist. An
    /// explicitly requested file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        check_concurrency(config.run.concurrency, "run.concurrency")?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.run.timeout_ms)
    }

    /// Whole-run timeout as a Duration, if configured
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run.run_timeout_ms.map(Duration::from_millis)
    }
}

/// Reject a concurrency outside `1..=MAX_CONCURRENCY`
pub fn check_concurrency(value: usize, setting: &str) -> Result<()> {
    if (1..=MAX_CONCURRENCY).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be between 1 and {}, got {}",
            setting, MAX_CONCURRENCY, value
        )))
    }
}

/// Parse a human duration such as `500ms`, `10s`, `2m` or `15`
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let raw = input.trim();
    let invalid = || Error::InvalidDuration(input.to_string());

    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sequential() {
        let config = Config::default();
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.run_timeout().is_none());
        assert_eq!(config.run.format, OutputFormat::Text);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[run]\nconcurrency = 4\ntimeout_ms = 1500\nformat = \"json\"\n\n[headers]\nRequestID = \"abc\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.run.format, OutputFormat::Json);
        assert_eq!(config.headers.get("RequestID").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_out_of_range_concurrency_rejected() {
        for value in [0, MAX_CONCURRENCY + 1, 1_000_000_000] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[run]\nconcurrency = {}", value).unwrap();
            let err = Config::load(Some(file.path())).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "concurrency {}", value);
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn test_check_concurrency_bounds() {
        assert!(check_concurrency(1, "--concurrency").is_ok());
        assert!(check_concurrency(MAX_CONCURRENCY, "--concurrency").is_ok());
        assert!(check_concurrency(0, "--concurrency").is_err());
        assert!(check_concurrency(usize::MAX, "--concurrency").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/probe/config.toml")));
        assert!(matches!(result, Err(Error::FileRead { .. })));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10h").is_err());
        assert!(parse_duration("-5s").is_err());
    }
}
