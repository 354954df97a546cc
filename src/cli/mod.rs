//! CLI command handling
//!
//! Builds the registry, probes and orchestrator from config and environment,
//! runs the session and prints the report.

mod console;

pub use console::{parse_reply, parse_review, ConsoleOperator};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::checklist::{self, Registry};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::credentials::Credentials;
use crate::common::{exit, Result};
use crate::device::TcpConnector;
use crate::engine::{AbortSignal, Orchestrator, Policy};
use crate::probe::ProbeSet;
use crate::report::{self, Report};

/// Dispatch a CLI command, returning the process exit status
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            checklist,
            config,
            json,
            report,
        } => run(checklist.as_deref(), config.as_deref(), json, report.as_deref()).await,

        Commands::Check { checklist, config } => {
            let (registry, probes, _, _) = build(checklist.as_deref(), config.as_deref())?;
            println!(
                "{} {} ({} steps)",
                "✓".green(),
                registry.name().white().bold(),
                registry.len()
            );
            for capability in registry.required_capabilities() {
                let name = probes
                    .get(capability)
                    .map(|entry| entry.probe.name().to_string())
                    .unwrap_or_default();
                println!("  {:<12} {}", capability.to_string(), name.dimmed());
            }
            Ok(exit::RELEASE_READY)
        }

        Commands::List { checklist } => {
            let checklist = checklist::load(checklist.as_deref())?;
            println!("{}", checklist.name.white().bold());
            if let Some(description) = &checklist.description {
                println!("  {}", description.trim().dimmed());
            }
            for (i, step) in checklist.steps.iter().enumerate() {
                let kind = match &step.automated_check {
                    Some(check) => check.capability.to_string(),
                    None => "manual".to_string(),
                };
                println!(
                    "  {:>2}. {:<20} {} {}",
                    i + 1,
                    step.id,
                    step.title,
                    format!("[{}]", kind).dimmed()
                );
            }
            Ok(exit::RELEASE_READY)
        }
    }
}

/// Load config and checklist and validate them against the probe set
fn build(
    checklist: Option<&Path>,
    config: Option<&Path>,
) -> Result<(Registry, ProbeSet, Config, Credentials)> {
    let config = Config::load(config)?;
    let credentials = Credentials::from_env();
    let probes = ProbeSet::from_config(&config, &credentials)?;
    let checklist = checklist::load(checklist)?;
    let registry = Registry::from_checklist(checklist, &probes)?;
    tracing::debug!(
        "Registry '{}' with {} steps, probes: {:?}",
        registry.name(),
        registry.len(),
        probes.capabilities()
    );
    Ok((registry, probes, config, credentials))
}

async fn run(
    checklist: Option<&Path>,
    config: Option<&Path>,
    json: bool,
    report_path: Option<&Path>,
) -> Result<i32> {
    let (registry, probes, config, credentials) = build(checklist, config)?;
    let connector = Arc::new(TcpConnector::new(Duration::from_secs(
        config.timeouts.connect_secs,
    )));
    let abort = AbortSignal::new();

    let mut orchestrator = Orchestrator::new(
        registry,
        probes,
        connector,
        credentials,
        Policy::from_config(&config),
        Box::new(ConsoleOperator::stdin()),
    )
    .with_abort_signal(abort.clone());
    let mut session = orchestrator.new_session();

    let signals = tokio::spawn(forward_signals(abort));
    let outcome = orchestrator.run(&mut session).await;
    signals.abort();

    let report = report::render(&session);
    emit(&report, json, report_path)?;

    match outcome {
        Ok(()) => Ok(report.exit_code),
        Err(e) if !session.is_finished() => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Ok(e.exit_code())
        }
        Err(e) => {
            tracing::error!("Session interrupted: {}", e);
            Ok(report.exit_code)
        }
    }
}

fn emit(report: &Report, json: bool, path: Option<&Path>) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print_console();
    }

    if let Some(path) = path {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => report.to_json()?,
            _ => report.to_text(),
        };
        std::fs::write(path, content)?;
        tracing::info!("Report written to {}", path.display());
    }
    Ok(())
}

/// Turn SIGINT/SIGTERM into an operator abort
#[cfg(unix)]
async fn forward_signals(abort: AbortSignal) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            tracing::warn!("Could not install signal handlers; Ctrl+C will not abort cleanly");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, aborting session"),
        _ = sigint.recv() => tracing::info!("Received SIGINT (Ctrl+C), aborting session"),
    }
    abort.trigger();
}

#[cfg(not(unix))]
async fn forward_signals(abort: AbortSignal) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, aborting session");
        abort.trigger();
    }
}
