//! Sluice command line front end
//!
//! `sluice check` validates sources, `sluice simulate` runs a sample message
//! in the sandbox and `sluice process` streams JSON lines through the
//! configured pipelines.

pub mod cli;
pub mod commands;
pub mod config;
pub mod tracing_setup;

use anyhow::{Context, Result};
use cli::{Cli, Command};
use commands::SimulateTarget;
use config::SluiceConfig;
use sluice_core::{FunctionRegistry, RuleMetrics};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Execute a parsed command line
pub fn run(cli: Cli) -> Result<ExitCode> {
    let config = SluiceConfig::load(cli.config.as_deref())?;
    tracing_setup::init_tracing(&config.logging)?;
    match &config.source {
        Some(path) => info!(path = %path.display(), mode = %config.engine.execution_mode, "Using configuration file"),
        None => warn!("Configuration file not found. Using default configuration."),
    }

    let registry = Arc::new(FunctionRegistry::with_builtins());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Check { files } => {
            let files = if files.is_empty() { config.source_files().cloned().collect() } else { files };
            let report = commands::check_sources(&files, &registry)?;
            for problem in &report.problems {
                writeln!(out, "{problem}")?;
            }
            writeln!(
                out,
                "{} rules, {} pipelines, {} problems",
                report.rules,
                report.pipelines,
                report.problems.len()
            )?;
            Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Simulate { rule, rule_name, pipeline, message } => {
            let target = match (rule, pipeline) {
                (Some(path), _) => SimulateTarget::RuleFile { path, name: rule_name },
                (None, Some(name)) => SimulateTarget::Pipeline(name),
                (None, None) => anyhow::bail!("either --rule or --pipeline is required"),
            };
            let message = commands::parse_message(&message)?;
            let simulation = commands::simulate(&config, registry, &target, &message)?;
            serde_json::to_writer_pretty(&mut out, &simulation).context("failed to write simulation")?;
            writeln!(out)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Process { input, pipelines, batch_size, stats } => {
            let metrics = stats.then(|| Arc::new(RuleMetrics::new()));
            let processor = commands::processor(&config, registry, metrics.clone())?;
            let selection = commands::selection(&pipelines, &config);
            match input {
                Some(path) => {
                    let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
                    commands::process_stream(&processor, &selection, BufReader::new(file), &mut out, batch_size)?;
                }
                None => {
                    commands::process_stream(&processor, &selection, io::stdin().lock(), &mut out, batch_size)?;
                }
            }
            if let Some(metrics) = metrics {
                for (rule, stats) in metrics.snapshot() {
                    info!(
                        rule = %rule,
                        evaluated = stats.evaluated,
                        matched = stats.matched,
                        executed = stats.executed,
                        failed = stats.failed,
                        "Rule statistics"
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Functions => {
            commands::list_functions(&registry, &mut out)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
