//! Dry runs of rules and pipelines
//!
//! The simulator runs the production [`Interpreter`] and [`StageExecutor`]
//! against a copy of a sample message. Effects that would leave the process
//! are captured by [`SandboxEffects`] as [`Intent`]s; field changes, stream
//! membership and control flags still apply to the copy so the resulting
//! message matches what production evaluation would produce.

use crate::executor::{ExecutorOptions, PipelineOutcome, StageExecutor};
use crate::interpreter::{EvaluationOutcome, Interpreter};
use crate::listener::InterpreterListener;
use crate::pipeline::Pipeline;
use crate::rule::Rule;
use crate::tracer::{TraceEntry, Tracer};
use serde::Serialize;
use sluice_functions::{FunctionRegistry, MessageEffects};
use sluice_types::{Message, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument};

/// An external effect that was requested but not performed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    RouteToStream { stream: String },
    RemoveFromStream { stream: String },
    Debug { value: String },
}

/// Effects implementation that records intents instead of reaching outside
#[derive(Debug, Default)]
pub struct SandboxEffects {
    intents: Mutex<Vec<Intent>>,
}

impl SandboxEffects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, intent: Intent) {
        self.intents.lock().unwrap_or_else(PoisonError::into_inner).push(intent);
    }

    /// Take the intents recorded so far
    pub fn take(&self) -> Vec<Intent> {
        std::mem::take(&mut *self.intents.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MessageEffects for SandboxEffects {
    fn route_to_stream(&self, message: &mut Message, stream_id: &str) {
        message.add_stream(stream_id);
        self.push(Intent::RouteToStream { stream: stream_id.to_string() });
    }

    fn remove_from_stream(&self, message: &mut Message, stream_id: &str) {
        message.remove_stream(stream_id);
        self.push(Intent::RemoveFromStream { stream: stream_id.to_string() });
    }

    fn debug(&self, _message: &Message, value: &Value) {
        self.push(Intent::Debug { value: value.to_string() });
    }
}

/// What to simulate
#[derive(Debug, Clone, Copy)]
pub enum SimulationTarget<'a> {
    Rule(&'a Rule),
    Pipeline(&'a Pipeline),
}

/// Outcome of the simulated target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum SimulationOutcome {
    Rule(EvaluationOutcome),
    Pipeline(PipelineOutcome),
}

impl SimulationOutcome {
    /// Whether the rule matched, or every stage of the pipeline ran
    #[must_use]
    pub fn matched(&self) -> bool {
        match self {
            Self::Rule(outcome) => outcome.matched,
            Self::Pipeline(outcome) => !outcome.terminal.is_early(),
        }
    }
}

/// Result of one simulation
#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    /// The sample message after processing
    #[serde(serialize_with = "serialize_message")]
    pub message: Message,
    pub trace: Vec<TraceEntry>,
    pub outcome: SimulationOutcome,
    /// Suppressed external effects in request order
    pub intents: Vec<Intent>,
}

fn serialize_message<S: serde::Serializer>(message: &Message, serializer: S) -> Result<S::Ok, S::Error> {
    message.to_json().serialize(serializer)
}

/// Runs rules and pipelines against sample messages without side effects
#[derive(Debug, Clone)]
pub struct Simulator {
    registry: Arc<FunctionRegistry>,
    options: ExecutorOptions,
}

impl Simulator {
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self::with_options(registry, ExecutorOptions::default())
    }

    /// Simulator whose pipeline runs use the given executor options
    #[must_use]
    pub const fn with_options(registry: Arc<FunctionRegistry>, options: ExecutorOptions) -> Self {
        Self { registry, options }
    }

    /// Run `target` against a copy of `sample`
    #[instrument(skip_all, fields(message_id = %sample.id()))]
    pub fn simulate(&self, target: SimulationTarget<'_>, sample: &Message) -> Simulation {
        let effects = Arc::new(SandboxEffects::new());
        let interpreter = Interpreter::with_effects(self.registry.clone(), effects.clone());
        let mut message = sample.clone();
        let mut tracer = Tracer::new();

        tracer.start_processing(&message);
        let outcome = match target {
            SimulationTarget::Rule(rule) => {
                SimulationOutcome::Rule(interpreter.evaluate_with(rule, &mut message, &mut tracer))
            }
            SimulationTarget::Pipeline(pipeline) => {
                let executor = StageExecutor::with_options(interpreter, self.options.clone());
                SimulationOutcome::Pipeline(executor.run_pipeline_with(pipeline, &mut message, &mut tracer))
            }
        };
        tracer.finish_processing(&message);

        let intents = effects.take();
        let trace = tracer.into_entries();
        debug!(entries = trace.len(), intents = intents.len(), "simulation finished");
        Simulation { message, trace, outcome, intents }
    }
}
