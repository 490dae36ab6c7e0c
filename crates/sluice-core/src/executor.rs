//! Stage executor
//!
//! Drives a message through the stages of a pipeline. Stages run in
//! increasing order and each stage runs in two phases:
//!
//! 1. every rule's `when` is evaluated in authored order, and the stage's
//!    match policy is decided from those results
//! 2. the `then` statements of the matched rules run in authored order
//!
//! Conditions therefore see the message as it was when the stage began,
//! while each rule's actions see the actions of the rules before it. After
//! each stage the executor decides whether the pipeline continues:
//!
//! - a rule called `stop_processing()`: stop ([`Terminal::Stopped`])
//! - a gated stage failed its match policy: stop ([`Terminal::GateFailed`])
//! - otherwise the next stage runs
//!
//! `drop_message()` only marks the message; stages and later pipelines still
//! run, and it is up to the caller to discard dropped messages.

use crate::error::StageFailure;
use crate::interpreter::{EvaluationOutcome, Interpreter};
use crate::listener::{InterpreterListener, NoopListener};
use crate::pipeline::{MatchPolicy, Pipeline, Stage};
use serde::Serialize;
use sluice_types::{Message, Value};
use tracing::{debug, instrument};

/// Default field receiving processing errors
pub const PROCESSING_ERROR_FIELD: &str = "processing_error";

/// Executor behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Append evaluation errors to the message
    pub record_processing_errors: bool,
    /// Field the errors are appended to
    pub processing_error_field: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { record_processing_errors: true, processing_error_field: PROCESSING_ERROR_FIELD.to_string() }
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub order: i32,
    pub policy: MatchPolicy,
    pub passed: bool,
    pub rules: Vec<EvaluationOutcome>,
}

impl StageOutcome {
    /// Number of rules whose condition held
    #[must_use]
    pub fn matched(&self) -> usize {
        self.rules.iter().filter(|r| r.matched).count()
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Terminal {
    /// Every stage ran
    Completed,
    /// A gated stage did not satisfy its policy
    GateFailed {
        #[serde(serialize_with = "serialize_failure")]
        failure: StageFailure,
    },
    /// `stop_processing()` was called in this stage
    Stopped { stage: i32 },
}

fn serialize_failure<S: serde::Serializer>(failure: &StageFailure, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&failure.to_string())
}

impl Terminal {
    /// Whether the pipeline ended before its last stage
    #[must_use]
    pub const fn is_early(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Outcome of running one pipeline over one message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub pipeline: String,
    pub stages: Vec<StageOutcome>,
    pub terminal: Terminal,
    /// A rule of this pipeline called `drop_message()`
    pub dropped: bool,
}

impl PipelineOutcome {
    /// The message was dropped while this pipeline ran
    #[must_use]
    pub const fn dropped(&self) -> bool {
        self.dropped
    }

    /// All recorded evaluation errors, rule by rule
    pub fn errors(&self) -> impl Iterator<Item = (&str, &sluice_types::EvaluationError)> {
        self.stages
            .iter()
            .flat_map(|s| s.rules.iter())
            .flat_map(|r| r.errors.iter().map(move |e| (r.rule.as_str(), e)))
    }
}

/// Runs pipelines over messages through an [`Interpreter`]
#[derive(Debug, Clone)]
pub struct StageExecutor {
    interpreter: Interpreter,
    options: ExecutorOptions,
}

impl StageExecutor {
    #[must_use]
    pub fn new(interpreter: Interpreter) -> Self {
        Self::with_options(interpreter, ExecutorOptions::default())
    }

    #[must_use]
    pub const fn with_options(interpreter: Interpreter, options: ExecutorOptions) -> Self {
        Self { interpreter, options }
    }

    #[must_use]
    pub const fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run a single pipeline
    pub fn run_pipeline(&self, pipeline: &Pipeline, message: &mut Message) -> PipelineOutcome {
        self.run_pipeline_with(pipeline, message, &mut NoopListener)
    }

    /// Run a single pipeline, reporting every step to `listener`
    #[instrument(level = "debug", skip_all, fields(pipeline = %pipeline.name(), message_id = %message.id()))]
    pub fn run_pipeline_with(
        &self,
        pipeline: &Pipeline,
        message: &mut Message,
        listener: &mut dyn InterpreterListener,
    ) -> PipelineOutcome {
        listener.enter_pipeline(pipeline);
        let mut stages = Vec::with_capacity(pipeline.stages().len());
        let mut terminal = Terminal::Completed;
        let mut dropped = false;

        for stage in pipeline.stages() {
            let outcome = self.run_stage(pipeline, stage, message, listener);
            dropped |= outcome.rules.iter().any(|r| r.dropped);
            let stopped = outcome.rules.iter().any(|r| r.stop_requested);

            terminal = if stopped {
                Terminal::Stopped { stage: stage.order() }
            } else if !outcome.passed && stage.is_gate() {
                Terminal::GateFailed {
                    failure: StageFailure {
                        pipeline: pipeline.name().to_string(),
                        stage: stage.order(),
                        policy: stage.policy(),
                        matched: outcome.matched(),
                        total: outcome.rules.len(),
                    },
                }
            } else {
                Terminal::Completed
            };
            stages.push(outcome);

            if terminal.is_early() {
                debug!(stage = stage.order(), ?terminal, "pipeline ends early");
                listener.stop_pipeline(pipeline, stage, &terminal);
                break;
            }
            listener.continue_pipeline(pipeline, stage);
        }

        listener.exit_pipeline(pipeline);
        PipelineOutcome { pipeline: pipeline.name().to_string(), stages, terminal, dropped }
    }

    fn run_stage(
        &self,
        pipeline: &Pipeline,
        stage: &Stage,
        message: &mut Message,
        listener: &mut dyn InterpreterListener,
    ) -> StageOutcome {
        listener.enter_stage(pipeline, stage);

        let mut rules: Vec<EvaluationOutcome> = stage
            .rules()
            .iter()
            .map(|rule| self.interpreter.evaluate_condition(rule, message, listener))
            .collect();
        let matched = rules.iter().filter(|r| r.matched).count();
        let passed = stage.policy().is_satisfied(matched, rules.len());

        for (rule, outcome) in stage.rules().iter().zip(rules.iter_mut()) {
            if outcome.matched {
                self.interpreter.execute_actions(rule, message, listener, outcome);
            }
            if !outcome.errors.is_empty() {
                debug!(rule = %outcome.rule, errors = outcome.errors.len(), "rule recorded errors");
                if self.options.record_processing_errors {
                    self.record_processing_errors(outcome, message);
                }
            }
        }

        listener.exit_stage(pipeline, stage, passed);
        StageOutcome { order: stage.order(), policy: stage.policy(), passed, rules }
    }

    fn record_processing_errors(&self, outcome: &EvaluationOutcome, message: &mut Message) {
        let field = &self.options.processing_error_field;
        let mut text = match message.field(field) {
            Some(Value::String(existing)) if !existing.is_empty() => existing.clone(),
            _ => String::new(),
        };
        for error in &outcome.errors {
            if !text.is_empty() {
                text.push_str(", ");
            }
            text.push_str(&format!("For rule '{}': {}", outcome.rule, error));
        }
        message.set_field(field.as_str(), Value::String(text));
    }

    /// Run several pipelines over one message in the given order
    ///
    /// Every pipeline runs, whether or not an earlier one dropped the message.
    pub fn process<'p, I>(&self, pipelines: I, message: &mut Message, listener: &mut dyn InterpreterListener) -> Vec<PipelineOutcome>
    where
        I: IntoIterator<Item = &'p Pipeline>,
    {
        listener.start_processing(message);
        let outcomes = pipelines.into_iter().map(|pipeline| self.run_pipeline_with(pipeline, message, listener)).collect();
        listener.finish_processing(message);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use sluice_functions::FunctionRegistry;
    use std::sync::Arc;

    fn executor() -> (StageExecutor, Arc<FunctionRegistry>) {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        (StageExecutor::new(Interpreter::new(registry.clone())), registry)
    }

    #[test]
    fn test_processing_errors_are_appended() {
        let (executor, registry) = executor();
        let rule = Arc::new(
            validate(
                "rule \"bad\" when true then set_field(\"a\", 1 / to_long($message.zero)); set_field(\"b\", 2); end",
                &registry,
            )
            .unwrap(),
        );
        let pipeline = Pipeline::new("p", vec![Stage::new(0, MatchPolicy::All, true, vec![rule.clone(), rule])]).unwrap();
        let mut message = Message::with_id("m");
        let outcome = executor.run_pipeline(&pipeline, &mut message);

        assert_eq!(outcome.terminal, Terminal::Completed);
        assert_eq!(message.field("b"), Some(&Value::Long(2)));
        assert_eq!(
            message.field(PROCESSING_ERROR_FIELD),
            Some(&Value::from("For rule 'bad': division by zero, For rule 'bad': division by zero"))
        );
    }

    #[test]
    fn test_stop_processing_ends_after_current_stage() {
        let (executor, registry) = executor();
        let stop = Arc::new(validate("rule \"stop\" when true then stop_processing(); end", &registry).unwrap());
        let mark = Arc::new(validate("rule \"mark\" when true then set_field(\"m\", true); end", &registry).unwrap());
        let pipeline = Pipeline::new(
            "p",
            vec![
                Stage::new(0, MatchPolicy::Any, true, vec![stop, mark.clone()]),
                Stage::new(1, MatchPolicy::Any, true, vec![mark]),
            ],
        )
        .unwrap();
        let mut message = Message::with_id("m");
        let outcome = executor.run_pipeline(&pipeline, &mut message);

        assert_eq!(outcome.terminal, Terminal::Stopped { stage: 0 });
        assert_eq!(outcome.stages.len(), 1);
        assert_eq!(outcome.stages[0].rules.len(), 2);
    }
}
