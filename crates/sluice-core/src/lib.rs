//! Core of the Sluice pipeline rule engine.
//!
//! Rules are written in a small typed language:
//!
//! ```text
//! rule "mark-high"
//! when has_field("status_code") && to_long($message.status_code) >= 500
//! then
//!   set_field("severity", "high");
//! end
//! ```
//!
//! Source text goes through the [`parser`] into an AST, the [`validator`]
//! type-checks it against a [`FunctionRegistry`] and produces an immutable
//! [`Rule`]. Rules are grouped into staged [`Pipeline`]s and executed per
//! message by the [`StageExecutor`], either by walking the tree with the
//! [`Interpreter`] or through closures produced by [`codegen`]. The
//! [`Simulator`] dry-runs the same code path with a recorded trace.
//!
//! Running configuration lives in a [`ConfigurationSnapshot`] that is
//! replaced atomically through a [`SnapshotHandle`].

/// Abstract syntax tree of rules and pipelines
pub mod ast;
/// Lowering of validated rules into closures
pub mod codegen;
/// Engine configuration
pub mod config;
/// Per-evaluation state
pub mod context;
/// Syntax, validation and build errors
pub mod error;
/// Stage and pipeline execution
pub mod executor;
/// Tree-walking evaluator
pub mod interpreter;
/// Tokenizer
pub mod lexer;
/// Execution observation hooks
pub mod listener;
/// Per-rule counters
pub mod metrics;
/// Runtime operator semantics
pub mod ops;
/// Recursive descent parser
pub mod parser;
/// Pipelines and stages
pub mod pipeline;
/// Worker pool over snapshots
pub mod processor;
/// Validated rules
pub mod rule;
/// Sandboxed dry runs
pub mod simulator;
/// Configuration snapshots
pub mod snapshot;
/// Execution traces
pub mod tracer;
/// Semantic validation
pub mod validator;

pub use codegen::{CompiledRule, compile};
pub use config::{EngineConfig, ExecutionMode};
pub use context::EvaluationContext;
pub use error::{PipelineError, SluiceError, SluiceResult, StageFailure, SyntaxError, ValidationError};
pub use executor::{ExecutorOptions, PipelineOutcome, StageExecutor, StageOutcome, Terminal};
pub use interpreter::{EvaluationOutcome, Interpreter};
pub use listener::{InterpreterListener, NoopListener};
pub use metrics::{RuleMetrics, RuleStats};
pub use parser::{parse_declarations, parse_expression, parse_pipeline, parse_rule};
pub use pipeline::{MatchPolicy, Pipeline, Stage};
pub use processor::{MessageProcessor, PipelineSelection, ProcessedMessage};
pub use rule::Rule;
pub use simulator::{Intent, SandboxEffects, Simulation, SimulationOutcome, SimulationTarget, Simulator};
pub use snapshot::{BuildReport, ConfigurationBuilder, ConfigurationSnapshot, SnapshotHandle};
pub use tracer::{TraceEntry, Tracer};
pub use validator::{validate, validate_decl};

pub use sluice_functions::{FunctionRegistry, MessageEffects};
pub use sluice_types::{EvaluationError, Message, Type, Value};
