//! Command line definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Pipeline rule engine for structured log messages")]
#[command(version)]
pub struct Cli {
    /// Configuration file, overrides SLUICE_CONFIG_PATH
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse and validate rule and pipeline sources
    Check {
        /// Source files; defaults to the files named in the configuration
        files: Vec<PathBuf>,
    },
    /// Run one sample message through a rule or pipeline without side effects
    Simulate {
        /// Source file holding the rule to simulate
        #[arg(long, conflicts_with = "pipeline", required_unless_present = "pipeline")]
        rule: Option<PathBuf>,
        /// Rule to pick when the file declares several
        #[arg(long, requires = "rule")]
        rule_name: Option<String>,
        /// Configured pipeline to simulate
        #[arg(long)]
        pipeline: Option<String>,
        /// Sample message as a JSON object, or @path to a JSON file
        #[arg(short, long)]
        message: String,
    },
    /// Process JSON lines from a file or stdin and write the results to stdout
    Process {
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Pipelines to run, in order; repeatable
        #[arg(short, long = "pipeline")]
        pipelines: Vec<String>,
        #[arg(long, default_value = "1000")]
        batch_size: usize,
        /// Log per-rule evaluation counters when done
        #[arg(long)]
        stats: bool,
    },
    /// List the registered functions and their signatures
    Functions,
}
