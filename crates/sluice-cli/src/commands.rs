//! Implementations of the `sluice` subcommands
//!
//! Every command reads and writes through generic readers and writers so the
//! integration tests can drive them without a terminal.

use crate::config::SluiceConfig;
use anyhow::{Context, Result, anyhow, bail};
use sluice_core::ast::Declaration;
use sluice_core::{
    BuildReport, ConfigurationBuilder, ConfigurationSnapshot, ExecutionMode, FunctionRegistry, Message,
    MessageProcessor, Pipeline, PipelineSelection, Rule, RuleMetrics, Simulation, SimulationTarget, Simulator,
    SnapshotHandle, compile, parse_declarations, validate_decl,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Build a snapshot from every source file named in the configuration
#[instrument(skip_all, fields(files = config.source_files().count(), mode = %config.engine.execution_mode))]
pub fn load_snapshot(config: &SluiceConfig, registry: Arc<FunctionRegistry>) -> Result<(ConfigurationSnapshot, BuildReport)> {
    let mut builder = ConfigurationBuilder::new(registry).with_config(config.engine.clone());
    for path in config.source_files() {
        let text = read_source(path)?;
        builder.add_source(&text);
    }
    let (snapshot, report) = builder.build();
    for rejected in &report.rejected {
        warn!(
            category = rejected.category(),
            severity = %rejected.severity(),
            error = %rejected,
            "Declaration rejected"
        );
    }
    info!(rules = report.rules, pipelines = report.pipelines, "Configuration loaded");
    Ok((snapshot, report))
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read source file {}", path.display()))
}

/// A problem found by `check`, attributed to its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub path: PathBuf,
    pub message: String,
}

impl Problem {
    fn new(path: &Path, message: impl fmt::Display) -> Self {
        Self { path: path.to_path_buf(), message: message.to_string() }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub rules: usize,
    pub pipelines: usize,
    pub problems: Vec<Problem>,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Parse and validate source files without building a snapshot
///
/// Rules are checked file by file; pipelines are resolved afterwards against
/// every rule that validated, wherever it was declared.
pub fn check_sources(files: &[PathBuf], registry: &FunctionRegistry) -> Result<CheckReport> {
    let mut report = CheckReport::default();
    let mut rules: HashMap<String, Arc<Rule>> = HashMap::new();
    let mut pending = Vec::new();

    for path in files {
        let text = read_source(path)?;
        let declarations = match parse_declarations(&text) {
            Ok(declarations) => declarations,
            Err(error) => {
                report.problems.push(Problem::new(path, error));
                continue;
            }
        };
        for declaration in declarations {
            match declaration {
                Declaration::Rule(decl) => {
                    let name = decl.name.clone();
                    match validate_decl(decl, registry) {
                        Ok(rule) => {
                            if rules.insert(name.clone(), Arc::new(rule)).is_some() {
                                report.problems.push(Problem::new(path, format!("duplicate rule '{name}'")));
                            }
                        }
                        Err(errors) => report
                            .problems
                            .extend(errors.iter().map(|e| Problem::new(path, format!("rule '{name}': {e}")))),
                    }
                }
                Declaration::Pipeline(decl) => pending.push((path, decl)),
            }
        }
    }
    report.rules = rules.len();

    let mut seen = HashSet::new();
    for (path, decl) in pending {
        if !seen.insert(decl.name.clone()) {
            report.problems.push(Problem::new(path, format!("duplicate pipeline '{}'", decl.name)));
            continue;
        }
        match Pipeline::resolve(&decl, |name| rules.get(name).cloned()) {
            Ok(_) => report.pipelines += 1,
            Err(error) => report.problems.push(Problem::new(path, error)),
        }
    }

    debug!(rules = report.rules, pipelines = report.pipelines, problems = report.problems.len(), "Checked sources");
    Ok(report)
}

/// What `simulate` runs the sample through
#[derive(Debug, Clone)]
pub enum SimulateTarget {
    /// A rule from a source file, picked by name when the file holds several
    RuleFile { path: PathBuf, name: Option<String> },
    /// A pipeline from the configured sources
    Pipeline(String),
}

/// Parse a message given inline as JSON or as `@path` to a JSON file
pub fn parse_message(argument: &str) -> Result<Message> {
    let text = match argument.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read message file {path}"))?,
        None => argument.to_string(),
    };
    let json: serde_json::Value = serde_json::from_str(&text).context("message is not valid JSON")?;
    Message::from_json(&json)
}

/// Load a single rule out of a source file
pub fn load_rule(path: &Path, name: Option<&str>, registry: &FunctionRegistry) -> Result<Rule> {
    let text = read_source(path)?;
    let declarations =
        parse_declarations(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    let mut candidates: Vec<_> = declarations
        .into_iter()
        .filter_map(|d| match d {
            Declaration::Rule(decl) => Some(decl),
            Declaration::Pipeline(_) => None,
        })
        .filter(|decl| name.is_none_or(|n| n == decl.name))
        .collect();

    let decl = match (candidates.len(), name) {
        (1, _) => candidates.remove(0),
        (0, Some(name)) => bail!("{} declares no rule named '{name}'", path.display()),
        (0, None) => bail!("{} declares no rules", path.display()),
        (_, _) => {
            let names = candidates.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", ");
            bail!("{} declares several rules ({names}); pick one with --rule-name", path.display())
        }
    };

    let rule_name = decl.name.clone();
    validate_decl(decl, registry).map_err(|errors| {
        let details = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        anyhow!("rule '{rule_name}' in {} is invalid: {details}", path.display())
    })
}

/// Run a sample message through a rule or pipeline in the sandbox
#[instrument(skip_all, fields(message_id = %message.id()))]
pub fn simulate(
    config: &SluiceConfig,
    registry: Arc<FunctionRegistry>,
    target: &SimulateTarget,
    message: &Message,
) -> Result<Simulation> {
    match target {
        SimulateTarget::RuleFile { path, name } => {
            let mut rule = load_rule(path, name.as_deref(), &registry)?;
            if config.engine.execution_mode == ExecutionMode::Compiled {
                let compiled = compile(&rule, &registry);
                rule = rule.with_compiled(compiled);
            }
            let simulator = Simulator::with_options(registry, config.engine.executor_options());
            Ok(simulator.simulate(SimulationTarget::Rule(&rule), message))
        }
        SimulateTarget::Pipeline(name) => {
            let (snapshot, _) = load_snapshot(config, registry)?;
            let pipeline = snapshot
                .select(std::slice::from_ref(name))
                .context("cannot simulate pipeline")?
                .remove(0);
            let simulator =
                Simulator::with_options(snapshot.registry().clone(), snapshot.executor().options().clone());
            Ok(simulator.simulate(SimulationTarget::Pipeline(pipeline.as_ref()), message))
        }
    }
}

/// Counters for one `process` run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub received: usize,
    pub emitted: usize,
    pub dropped: usize,
    /// Rule failures across all messages
    pub rule_errors: usize,
}

/// Pipeline selection from the command line, else from the configuration
#[must_use]
pub fn selection(requested: &[String], config: &SluiceConfig) -> PipelineSelection {
    if !requested.is_empty() {
        PipelineSelection::Named(requested.to_vec())
    } else if !config.pipelines.run.is_empty() {
        PipelineSelection::Named(config.pipelines.run.clone())
    } else {
        PipelineSelection::All
    }
}

/// Build a processor over a freshly loaded snapshot
pub fn processor(config: &SluiceConfig, registry: Arc<FunctionRegistry>, metrics: Option<Arc<RuleMetrics>>) -> Result<MessageProcessor> {
    let (snapshot, _) = load_snapshot(config, registry)?;
    let handle = Arc::new(SnapshotHandle::new(snapshot));
    let processor = MessageProcessor::new(handle, config.engine.clone());
    Ok(match metrics {
        Some(metrics) => processor.with_metrics(metrics),
        None => processor,
    })
}

/// Read JSON lines from `input`, process them in batches and write every
/// message that was not dropped to `output` as one JSON line
#[instrument(skip_all, fields(batch_size = batch_size))]
pub fn process_stream<R: BufRead, W: Write>(
    processor: &MessageProcessor,
    selection: &PipelineSelection,
    input: R,
    output: &mut W,
    batch_size: usize,
) -> Result<ProcessSummary> {
    let batch_size = batch_size.max(1);
    let mut summary = ProcessSummary::default();
    let mut batch = Vec::with_capacity(batch_size);

    for (index, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let json: serde_json::Value =
            serde_json::from_str(&line).with_context(|| format!("line {} is not valid JSON", index + 1))?;
        batch.push(Message::from_json(&json).with_context(|| format!("line {} is not a message", index + 1))?);
        if batch.len() == batch_size {
            flush(processor, selection, std::mem::take(&mut batch), output, &mut summary)?;
        }
    }
    if !batch.is_empty() {
        flush(processor, selection, batch, output, &mut summary)?;
    }
    output.flush().context("failed to flush output")?;

    info!(
        received = summary.received,
        emitted = summary.emitted,
        dropped = summary.dropped,
        rule_errors = summary.rule_errors,
        "Processing finished"
    );
    Ok(summary)
}

fn flush<W: Write>(
    processor: &MessageProcessor,
    selection: &PipelineSelection,
    batch: Vec<Message>,
    output: &mut W,
    summary: &mut ProcessSummary,
) -> Result<()> {
    summary.received += batch.len();
    let processed = processor.process_batch(batch, selection)?;
    for item in processed {
        summary.rule_errors += item.outcomes.iter().map(|o| o.errors().count()).sum::<usize>();
        if item.message.is_dropped() {
            summary.dropped += 1;
            continue;
        }
        serde_json::to_writer(&mut *output, &item.message.to_json()).context("failed to write message")?;
        output.write_all(b"\n").context("failed to write message")?;
        summary.emitted += 1;
    }
    Ok(())
}

/// One line per registered function: signature, purity marker and summary
pub fn list_functions<W: Write>(registry: &FunctionRegistry, output: &mut W) -> Result<()> {
    for name in registry.names() {
        let Some(descriptor) = registry.descriptor(name) else { continue };
        let marker = if descriptor.is_pure { "" } else { " [effect]" };
        writeln!(output, "{}{marker}\n    {}", descriptor.signature(), descriptor.description)?;
    }
    Ok(())
}
