//! Report rendering
//!
//! Text output is meant for people, JSON output for pipelines. Both show
//! expected and actual values for every scenario that did not match.

use std::fmt::Write as _;
use std::path::Path;

use colored::Colorize;

use crate::common::{Error, Result};

use super::matcher::Outcome;
use super::runner::{ExecutionResult, RunReport};

/// Render the human-readable summary
///
/// With `verbose`, matched scenarios are listed too.
pub fn render_text(report: &RunReport, verbose: bool) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "\n{} {}",
        "Suite:".blue().bold(),
        report.suite.white().bold()
    );

    for result in &report.results {
        if result.matched && !verbose {
            continue;
        }
        render_result(&mut out, result);
    }

    let summary = format!(
        "{} passed, {} failed ({} total) in {:.2}s",
        report.total_passed,
        report.total_failed,
        report.results.len(),
        report.duration.as_secs_f64()
    );
    let _ = writeln!(out);
    if report.success() {
        let _ = writeln!(out, "{} {}", "✓".green().bold(), summary.green().bold());
    } else {
        let _ = writeln!(out, "{} {}", "✗".red().bold(), summary.red().bold());
    }

    out
}

fn render_result(out: &mut String, result: &ExecutionResult) {
    let elapsed = format!("({}ms)", result.duration.as_millis());
    match result.outcome {
        Outcome::Matched => {
            let _ = writeln!(out, "  {} {} {}", "✓".green(), result.name, elapsed.dimmed());
        }
        Outcome::Mismatched => {
            let _ = writeln!(out, "  {} {} {}", "✗".red(), result.name.red(), elapsed.dimmed());
        }
        Outcome::Errored => {
            let _ = writeln!(
                out,
                "  {} {} {} {}",
                "!".yellow().bold(),
                result.name.yellow(),
                "[errored]".yellow(),
                elapsed.dimmed()
            );
        }
    }

    for failure in &result.failures {
        let _ = writeln!(out, "      {}", failure.check.cyan());
        let _ = writeln!(out, "        expected: {}", failure.expected);
        let _ = writeln!(out, "        actual:   {}", failure.actual);
    }
}

/// Render the report as one pretty-printed JSON object
pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the JSON report to `path`
pub fn write_report_file(report: &RunReport, path: &Path) -> Result<()> {
    let json = render_json(report)?;
    std::fs::write(path, json + "\n").map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    tracing::info!(path = %path.display(), "Wrote JSON report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::matcher::Failure;
    use std::time::Duration;

    fn result(index: usize, name: &str, outcome: Outcome, failures: Vec<Failure>) -> ExecutionResult {
        ExecutionResult {
            index,
            name: name.to_string(),
            outcome,
            matched: outcome == Outcome::Matched,
            actual_status: Some(400),
            actual_body: Some(r#"{"status":"ERROR"}"#.to_string()),
            duration: Duration::from_millis(12),
            failures,
        }
    }

    fn mixed_report() -> RunReport {
        RunReport::new(
            "quick-claim",
            vec![
                result(0, "success", Outcome::Matched, Vec::new()),
                result(
                    1,
                    "invalid-email",
                    Outcome::Mismatched,
                    vec![Failure::new("status", "400", "201")],
                ),
                result(
                    2,
                    "unreachable",
                    Outcome::Errored,
                    vec![Failure::new("transport", "HTTP 201 response", "connection refused")],
                ),
            ],
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_text_shows_expected_and_actual() {
        colored::control::set_override(false);
        let text = render_text(&mixed_report(), false);

        assert!(text.contains("Suite: quick-claim"));
        assert!(!text.contains("success"));
        assert!(text.contains("✗ invalid-email"));
        assert!(text.contains("expected: 400"));
        assert!(text.contains("actual:   201"));
        assert!(text.contains("unreachable [errored]"));
        assert!(text.contains("actual:   connection refused"));
        assert!(text.contains("1 passed, 2 failed (3 total) in 1.50s"));
    }

    #[test]
    fn test_verbose_lists_matched() {
        colored::control::set_override(false);
        let text = render_text(&mixed_report(), true);
        assert!(text.contains("✓ success (12ms)"));
    }

    #[test]
    fn test_json_round_trips_counts() {
        let json = render_json(&mixed_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["suite"], "quick-claim");
        assert_eq!(value["total_passed"], 1);
        assert_eq!(value["total_failed"], 2);
        assert_eq!(value["results"].as_array().unwrap().len(), 3);
        assert_eq!(value["results"][1]["failures"][0]["expected"], "400");
    }

    #[test]
    fn test_write_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report_file(&mixed_report(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"total_failed\": 2"));
    }

    #[test]
    fn test_write_report_file_bad_path() {
        let err = write_report_file(&mixed_report(), Path::new("/nonexistent/dir/report.json"))
            .unwrap_err();
        assert!(matches!(err, Error::FileWrite { .. }));
    }
}
