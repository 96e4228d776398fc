//! probe - declarative HTTP contract testing
//!
//! Runs YAML/JSON scenario suites against an HTTP endpoint and reports
//! every expected-versus-actual divergence.
//!
//! Exit codes: 0 when every scenario matched, 1 when any did not, 2 when
//! the harness itself could not run (bad suite, bad config, bad flags).

use std::path::PathBuf;

use clap::Parser;
use probe::cli::{self, GlobalOptions};
use probe::commands::Commands;
use probe::common::logging;

#[derive(Parser)]
#[command(name = "probe", about = "Declarative HTTP contract testing")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: platform config dir, probe/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append full-detail logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Show matched scenarios and debug logs
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_guard = match logging::init_cli(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let global = GlobalOptions {
        config: cli.config,
        verbose: cli.verbose,
    };

    let code = match cli::dispatch(cli.command, &global).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            tracing::debug!(error = ?e, "Harness error");
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };

    // Flush the log file before exiting
    drop(log_guard);
    std::process::exit(code);
}
