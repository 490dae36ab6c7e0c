//! Configuration snapshots and their atomic publication
//!
//! A [`ConfigurationSnapshot`] bundles the function registry, every admitted
//! rule and every resolved pipeline. Snapshots are immutable. Reloading means
//! building a new one with [`ConfigurationBuilder`] and handing it to
//! [`SnapshotHandle::publish`], which replaces the current snapshot with a
//! single atomic store. Readers pin a snapshot with [`SnapshotHandle::load`]
//! and keep using it for as long as they hold the `Arc`.

use crate::ast::{Declaration, PipelineDecl, RuleDecl};
use crate::codegen;
use crate::config::{EngineConfig, ExecutionMode};
use crate::error::{PipelineError, SluiceError, SluiceResult, ValidationError};
use crate::executor::StageExecutor;
use crate::interpreter::Interpreter;
use crate::parser::parse_declarations;
use crate::pipeline::Pipeline;
use crate::rule::Rule;
use crate::validator::validate_decl;
use arc_swap::ArcSwap;
use sluice_functions::FunctionRegistry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};

/// An immutable, self-consistent set of rules and pipelines
#[derive(Debug)]
pub struct ConfigurationSnapshot {
    version: u64,
    registry: Arc<FunctionRegistry>,
    rules: BTreeMap<String, Arc<Rule>>,
    pipelines: BTreeMap<String, Arc<Pipeline>>,
    mode: ExecutionMode,
    executor: StageExecutor,
}

impl ConfigurationSnapshot {
    /// A snapshot without rules or pipelines
    #[must_use]
    pub fn empty(registry: Arc<FunctionRegistry>) -> Self {
        ConfigurationBuilder::new(registry).build().0
    }

    /// Version assigned when the snapshot was published, 0 before that
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Executor bound to this snapshot's registry and options
    #[must_use]
    pub const fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    /// Rules in name order
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(name)
    }

    /// Pipelines in name order
    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<Pipeline>> {
        self.pipelines.values()
    }

    /// Look up pipelines by name, keeping the requested order
    ///
    /// # Errors
    ///
    /// `UnknownPipeline` for the first name the snapshot does not contain.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> SluiceResult<Vec<Arc<Pipeline>>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.pipelines
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SluiceError::UnknownPipeline { name: name.to_string() })
            })
            .collect()
    }
}

/// What happened while building a snapshot
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Admitted rules
    pub rules: usize,
    /// Admitted pipelines
    pub pipelines: usize,
    /// Everything that was left out, in discovery order
    pub rejected: Vec<SluiceError>,
}

impl BuildReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Collects rule and pipeline sources and turns them into a snapshot
///
/// A rejected rule or pipeline is reported and left out; it never prevents
/// the rest of the configuration from loading. Pipelines referencing a
/// rejected or unknown rule are rejected themselves.
#[derive(Debug)]
pub struct ConfigurationBuilder {
    registry: Arc<FunctionRegistry>,
    config: EngineConfig,
    rules: Vec<RuleDecl>,
    pipelines: Vec<PipelineDecl>,
    rejected: Vec<SluiceError>,
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            rules: Vec::new(),
            pipelines: Vec::new(),
            rejected: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a source text holding any mix of rule and pipeline declarations
    ///
    /// A syntax error rejects the whole text.
    pub fn add_source(&mut self, source: &str) -> &mut Self {
        match parse_declarations(source) {
            Ok(declarations) => {
                for declaration in declarations {
                    match declaration {
                        Declaration::Rule(rule) => self.rules.push(rule),
                        Declaration::Pipeline(pipeline) => self.pipelines.push(pipeline),
                    }
                }
            }
            Err(error) => {
                warn!(%error, "source rejected");
                self.rejected.push(SluiceError::RuleRejected { name: None, errors: vec![ValidationError::Syntax(error)] });
            }
        }
        self
    }

    /// Validate every rule, resolve every pipeline and assemble the snapshot
    #[instrument(skip_all, fields(rules = self.rules.len(), pipelines = self.pipelines.len(), mode = %self.config.execution_mode))]
    pub fn build(self) -> (ConfigurationSnapshot, BuildReport) {
        let Self { registry, config, rules: rule_decls, pipelines: pipeline_decls, mut rejected } = self;

        let mut rules: BTreeMap<String, Arc<Rule>> = BTreeMap::new();
        for decl in rule_decls {
            let name = decl.name.clone();
            if rules.contains_key(&name) {
                warn!(rule = %name, "duplicate rule ignored");
                rejected.push(SluiceError::DuplicateRule { name });
                continue;
            }
            match validate_decl(decl, &registry) {
                Ok(rule) => {
                    let rule = match config.execution_mode {
                        ExecutionMode::Compiled => {
                            let compiled = codegen::compile(&rule, &registry);
                            rule.with_compiled(compiled)
                        }
                        ExecutionMode::Interpreted => rule,
                    };
                    rules.insert(name, Arc::new(rule));
                }
                Err(errors) => {
                    warn!(rule = %name, errors = errors.len(), "rule rejected");
                    rejected.push(SluiceError::RuleRejected { name: Some(name), errors });
                }
            }
        }

        let mut pipelines: BTreeMap<String, Arc<Pipeline>> = BTreeMap::new();
        for decl in pipeline_decls {
            if pipelines.contains_key(&decl.name) {
                warn!(pipeline = %decl.name, "duplicate pipeline ignored");
                rejected.push(SluiceError::DuplicatePipeline { name: decl.name });
                continue;
            }
            match Pipeline::resolve(&decl, |name| rules.get(name).cloned()) {
                Ok(pipeline) => {
                    pipelines.insert(decl.name, Arc::new(pipeline));
                }
                Err(source) => {
                    warn!(pipeline = %decl.name, error = %source, "pipeline rejected");
                    rejected.push(rejected_pipeline(decl.name, source));
                }
            }
        }

        let report = BuildReport { rules: rules.len(), pipelines: pipelines.len(), rejected };
        info!(rules = report.rules, pipelines = report.pipelines, rejected = report.rejected.len(), "configuration built");

        let executor = StageExecutor::with_options(Interpreter::new(registry.clone()), config.executor_options());
        let snapshot = ConfigurationSnapshot { version: 0, registry, rules, pipelines, mode: config.execution_mode, executor };
        (snapshot, report)
    }
}

fn rejected_pipeline(name: String, source: PipelineError) -> SluiceError {
    SluiceError::PipelineRejected { name: Some(name), source }
}

/// Shared handle to the current snapshot
///
/// Loads are lock-free. Publishers are serialized so versions increase in
/// publication order.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: ArcSwap<ConfigurationSnapshot>,
    version: AtomicU64,
    publish_lock: Mutex<()>,
}

impl SnapshotHandle {
    /// Handle publishing `initial` as version 1
    #[must_use]
    pub fn new(mut initial: ConfigurationSnapshot) -> Self {
        initial.version = 1;
        Self { current: ArcSwap::from_pointee(initial), version: AtomicU64::new(1), publish_lock: Mutex::new(()) }
    }

    /// Pin the current snapshot
    #[must_use]
    pub fn load(&self) -> Arc<ConfigurationSnapshot> {
        self.current.load_full()
    }

    /// Version of the current snapshot
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Replace the current snapshot, returning the version assigned to it
    ///
    /// Readers holding the previous snapshot keep it until they drop it.
    #[instrument(skip_all, fields(rules = snapshot.rules.len(), pipelines = snapshot.pipelines.len()))]
    pub fn publish(&self, mut snapshot: ConfigurationSnapshot) -> u64 {
        let _guard = self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.version.load(Ordering::Acquire) + 1;
        snapshot.version = version;
        self.current.store(Arc::new(snapshot));
        self.version.store(version, Ordering::Release);
        info!(version, "configuration snapshot published");
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
        rule "tag" when true then set_field("tagged", true); end
        rule "broken" when 1 then end
        pipeline "main"
        stage 0 match all
          rule "tag";
        end
        pipeline "needs-broken"
        stage 0 match all
          rule "broken";
        end
    "#;

    #[test]
    fn test_rejections_do_not_block_the_rest() {
        let mut builder = ConfigurationBuilder::new(Arc::new(FunctionRegistry::with_builtins()));
        builder.add_source(SOURCE).add_source("rule \"oops\" when");
        let (snapshot, report) = builder.build();

        assert_eq!(report.rules, 1);
        assert_eq!(report.pipelines, 1);
        assert_eq!(report.rejected.len(), 3);
        assert!(snapshot.pipeline("main").is_some());
        assert!(snapshot.pipeline("needs-broken").is_none());
        assert!(matches!(&report.rejected[1], SluiceError::RuleRejected { name: Some(n), .. } if n == "broken"));
        assert!(matches!(
            &report.rejected[2],
            SluiceError::PipelineRejected { source: PipelineError::UnknownRule { .. }, .. }
        ));
    }

    #[test]
    fn test_compiled_mode_compiles_every_rule() {
        let config = EngineConfig { execution_mode: ExecutionMode::Compiled, ..EngineConfig::default() };
        let mut builder = ConfigurationBuilder::new(Arc::new(FunctionRegistry::with_builtins())).with_config(config);
        builder.add_source(SOURCE);
        let (snapshot, _) = builder.build();
        assert!(snapshot.rules().all(|r| r.is_compiled()));
    }

    #[test]
    fn test_publish_bumps_version() {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        let handle = SnapshotHandle::new(ConfigurationSnapshot::empty(registry.clone()));
        let pinned = handle.load();
        assert_eq!(pinned.version(), 1);

        assert_eq!(handle.publish(ConfigurationSnapshot::empty(registry)), 2);
        assert_eq!(handle.load().version(), 2);
        assert_eq!(pinned.version(), 1);
    }
}
