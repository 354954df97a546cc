//! CLI command definitions
//!
//! Defines the clap commands for the rigcheck CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run an acceptance session against the configured machine
    Run {
        /// Checklist YAML file (default: built-in release checklist)
        #[arg(long, short)]
        checklist: Option<PathBuf>,

        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the final report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate the checklist against the configured probes without connecting
    Check {
        /// Checklist YAML file (default: built-in release checklist)
        #[arg(long, short)]
        checklist: Option<PathBuf>,

        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the checklist steps
    #[command(alias = "ls")]
    List {
        /// Checklist YAML file (default: built-in release checklist)
        #[arg(long, short)]
        checklist: Option<PathBuf>,
    },
}
