//! rigcheck - hardware-in-the-loop acceptance test orchestrator
//!
//! Walks an operator through a release checklist against a live machine,
//! gathering automated evidence where a probe exists.

use clap::Parser;
use colored::Colorize;
use commands::Commands;
use rigcheck::{cli, commands, common};

#[derive(Parser)]
#[command(name = "rigcheck", about = "Operator-driven release acceptance runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Debug-level logging for rigcheck (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let logging = common::logging::init(cli.verbose);
    if let Some(path) = &logging.log_path {
        tracing::debug!("Logging to {}", path.display());
    }

    let code = match cli::dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            e.exit_code()
        }
    };

    // flush the log file before exiting
    drop(logging);
    std::process::exit(code);
}
