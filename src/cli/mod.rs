//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::commands::{Commands, RunArgs};
use crate::common::config::{check_concurrency, Config, OutputFormat};
use crate::common::{Error, Result};
use crate::testing::{
    load_suite, parse_header_line, preflight, render_json, render_text, write_report_file,
    HttpExecutor, LoadOptions, RunOptions, ScenarioRunner, Suite,
};

/// Options shared by every command
#[derive(Debug, Default)]
pub struct GlobalOptions {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// List matched scenarios and log at debug level
    pub verbose: bool,
}

/// Dispatch a CLI command
///
/// Returns whether the command succeeded from the user's point of view:
/// for `run`, true iff every scenario matched.
pub async fn dispatch(command: Commands, global: &GlobalOptions) -> Result<bool> {
    let config = Config::load(global.config.as_deref())?;

    match command {
        Commands::Run(args) => run(args, &config, global.verbose).await,

        Commands::Validate { suite } => {
            let suite = load_suite(&suite, &load_options(&config, &[])?)?;
            print_suite(&suite);
            Ok(true)
        }
    }
}

async fn run(args: RunArgs, config: &Config, verbose: bool) -> Result<bool> {
    let concurrency = args.concurrency.unwrap_or(config.run.concurrency);
    check_concurrency(concurrency, "--concurrency")?;
    let timeout = args.timeout.unwrap_or_else(|| config.request_timeout());
    let run_timeout = args.run_timeout.or_else(|| config.run_timeout());
    let format = args.format.unwrap_or(config.run.format);

    let suite = load_suite(&args.suite, &load_options(config, &args.headers)?)?;
    let suite = match &args.filter {
        Some(needle) => suite.filtered(needle)?,
        None => suite,
    };

    let executor = HttpExecutor::new(&args.target, timeout)?;
    if args.preflight {
        preflight(&args.target, timeout).await?;
    }

    let mut runner = ScenarioRunner::new(
        Arc::new(executor),
        RunOptions {
            concurrency,
            run_timeout,
        },
    );
    if format == OutputFormat::Text {
        runner = runner.with_progress(progress_bar(suite.scenarios.len() as u64));
    }

    let report = runner.run(&suite).await;

    match format {
        OutputFormat::Text => print!("{}", render_text(&report, verbose)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }
    if let Some(path) = &args.report {
        write_report_file(&report, path)?;
    }

    Ok(report.success())
}

fn load_options(config: &Config, cli_headers: &[String]) -> Result<LoadOptions> {
    let cli_headers = cli_headers
        .iter()
        .map(|line| {
            parse_header_line(line).ok_or_else(|| {
                Error::Config(format!("Invalid header '{}'. Use 'Name: value'", line))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LoadOptions {
        config_headers: config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        cli_headers,
    })
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn print_suite(suite: &Suite) {
    println!(
        "{} Suite '{}' is valid: {} scenario(s)",
        "✓".green(),
        suite.name.white().bold(),
        suite.scenarios.len()
    );
    for scenario in &suite.scenarios {
        let request = &scenario.request;
        println!(
            "  {} {} {} -> {} ({} body assertion(s))",
            scenario.name,
            request.method.as_str().dimmed(),
            request.path.dimmed(),
            scenario.expectation.status,
            scenario.expectation.body.len()
        );
    }
}
