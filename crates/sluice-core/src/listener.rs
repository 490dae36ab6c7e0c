//! Observation hooks for rule and pipeline execution
//!
//! The interpreter and stage executor report every transition to an
//! [`InterpreterListener`]. All methods default to no-ops so implementations
//! override only what they need. The tracer and the metrics collector are
//! both listeners.

use crate::ast::Statement;
use crate::executor::Terminal;
use crate::pipeline::{Pipeline, Stage};
use crate::rule::Rule;
use sluice_types::{EvaluationError, Message};

#[allow(unused_variables)]
pub trait InterpreterListener {
    fn start_processing(&mut self, message: &Message) {}

    fn finish_processing(&mut self, message: &Message) {}

    fn enter_pipeline(&mut self, pipeline: &Pipeline) {}

    fn exit_pipeline(&mut self, pipeline: &Pipeline) {}

    fn enter_stage(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    fn exit_stage(&mut self, pipeline: &Pipeline, stage: &Stage, passed: bool) {}

    /// About to evaluate the rule's condition
    fn evaluate_rule(&mut self, rule: &Rule) {}

    fn satisfy_rule(&mut self, rule: &Rule) {}

    fn dissatisfy_rule(&mut self, rule: &Rule) {}

    /// The condition raised an error and counts as not matched
    fn fail_condition(&mut self, rule: &Rule, error: &EvaluationError) {}

    fn execute_rule(&mut self, rule: &Rule) {}

    fn execute_statement(&mut self, rule: &Rule, index: usize, statement: &Statement) {}

    fn fail_statement(&mut self, rule: &Rule, index: usize, error: &EvaluationError) {}

    fn finish_execute_rule(&mut self, rule: &Rule) {}

    /// The stage allows the next one to run
    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    /// The pipeline ends early after `stage`
    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage, terminal: &Terminal) {}
}

/// Listener that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl InterpreterListener for NoopListener {}
