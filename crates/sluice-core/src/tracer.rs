//! Execution tracer
//!
//! A [`Tracer`] is an [`InterpreterListener`] that turns every execution step
//! into a [`TraceEntry`]. All entries are timed against one monotonic
//! stopwatch that starts at `start_processing`; the last reading is taken at
//! `finish_processing`.

use crate::ast::Statement;
use crate::executor::Terminal;
use crate::listener::InterpreterListener;
use crate::pipeline::{Pipeline, Stage};
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use sluice_types::{EvaluationError, Message};
use std::fmt;
use std::time::Instant;

/// One timestamped step of an execution trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Microseconds since processing started
    pub elapsed_micros: u64,
    pub message: String,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}µs {}", self.elapsed_micros, self.message)
    }
}

/// Records an ordered execution trace for one run
#[derive(Debug, Default)]
pub struct Tracer {
    started: Option<Instant>,
    entries: Vec<TraceEntry>,
}

impl Tracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded so far
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }

    fn record(&mut self, message: String) {
        // Events before start_processing start the clock themselves.
        let started = *self.started.get_or_insert_with(Instant::now);
        let elapsed_micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.entries.push(TraceEntry { elapsed_micros, message });
    }
}

impl InterpreterListener for Tracer {
    fn start_processing(&mut self, message: &Message) {
        self.started = Some(Instant::now());
        self.record(format!("Starting message processing for message {}", message.id()));
    }

    fn finish_processing(&mut self, message: &Message) {
        let state = if message.is_dropped() { "dropped" } else { "kept" };
        self.record(format!("Finished message processing, message {state}"));
    }

    fn enter_pipeline(&mut self, pipeline: &Pipeline) {
        self.record(format!("Enter pipeline '{}'", pipeline.name()));
    }

    fn exit_pipeline(&mut self, pipeline: &Pipeline) {
        self.record(format!("Exit pipeline '{}'", pipeline.name()));
    }

    fn enter_stage(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.record(format!(
            "Enter stage {} of pipeline '{}' (match {}, {} rules)",
            stage.order(),
            pipeline.name(),
            stage.policy(),
            stage.rules().len()
        ));
    }

    fn exit_stage(&mut self, pipeline: &Pipeline, stage: &Stage, passed: bool) {
        let verdict = if passed { "passed" } else { "failed" };
        self.record(format!("Exit stage {} of pipeline '{}': {verdict}", stage.order(), pipeline.name()));
    }

    fn evaluate_rule(&mut self, rule: &Rule) {
        self.record(format!("Evaluate rule '{}'", rule.name()));
    }

    fn satisfy_rule(&mut self, rule: &Rule) {
        self.record(format!("Condition of rule '{}' matched", rule.name()));
    }

    fn dissatisfy_rule(&mut self, rule: &Rule) {
        self.record(format!("Condition of rule '{}' did not match", rule.name()));
    }

    fn fail_condition(&mut self, rule: &Rule, error: &EvaluationError) {
        self.record(format!("Condition of rule '{}' failed: {error}", rule.name()));
    }

    fn execute_rule(&mut self, rule: &Rule) {
        self.record(format!("Execute rule '{}'", rule.name()));
    }

    fn execute_statement(&mut self, rule: &Rule, index: usize, statement: &Statement) {
        self.record(format!("Rule '{}' statement {index}: {statement}", rule.name()));
    }

    fn fail_statement(&mut self, rule: &Rule, index: usize, error: &EvaluationError) {
        self.record(format!("Rule '{}' statement {index} failed: {error}", rule.name()));
    }

    fn finish_execute_rule(&mut self, rule: &Rule) {
        self.record(format!("Finished executing rule '{}'", rule.name()));
    }

    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.record(format!("Stage {} of pipeline '{}' allows the next stage", stage.order(), pipeline.name()));
    }

    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage, terminal: &Terminal) {
        let reason = match terminal {
            Terminal::Completed => "completed".to_string(),
            Terminal::GateFailed { failure } => failure.to_string(),
            Terminal::Stopped { .. } => "stop_processing() was called".to_string(),
        };
        self.record(format!("Pipeline '{}' ends after stage {}: {reason}", pipeline.name(), stage.order()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use crate::validator::validate;
    use sluice_functions::FunctionRegistry;
    use std::sync::Arc;

    #[test]
    fn test_trace_is_ordered_and_monotonic() {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        let rule = validate("rule \"r\" when true then let x = 1; set_field(\"x\", x); end", &registry).unwrap();
        let mut message = Message::with_id("m-1");
        let mut tracer = Tracer::new();

        tracer.start_processing(&message);
        Interpreter::new(registry).evaluate_with(&rule, &mut message, &mut tracer);
        tracer.finish_processing(&message);

        let entries = tracer.into_entries();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Starting message processing for message m-1",
                "Evaluate rule 'r'",
                "Condition of rule 'r' matched",
                "Execute rule 'r'",
                "Rule 'r' statement 0: let x = 1;",
                "Rule 'r' statement 1: set_field(\"x\", x);",
                "Finished executing rule 'r'",
                "Finished message processing, message kept",
            ]
        );
        assert!(entries.windows(2).all(|w| w[0].elapsed_micros <= w[1].elapsed_micros));
    }
}
