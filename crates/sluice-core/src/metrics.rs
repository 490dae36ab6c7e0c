//! Per-rule execution counters
//!
//! [`RuleMetrics`] is shared between worker threads; each worker reports into
//! it through a `&RuleMetrics` listener. Counters are lock-free atomics inside
//! a `DashMap` keyed by rule name.

use crate::listener::InterpreterListener;
use crate::rule::Rule;
use dashmap::DashMap;
use serde::Serialize;
use sluice_types::EvaluationError;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct RuleCounters {
    evaluated: AtomicU64,
    matched: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time counters of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    pub evaluated: u64,
    pub matched: u64,
    pub executed: u64,
    /// Condition or statement failures
    pub failed: u64,
}

/// Evaluation counters keyed by rule name
#[derive(Debug, Default)]
pub struct RuleMetrics {
    rules: DashMap<String, RuleCounters>,
}

impl RuleMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, rule: &Rule, select: impl FnOnce(&RuleCounters) -> &AtomicU64) {
        if let Some(counters) = self.rules.get(rule.name()) {
            select(&counters).fetch_add(1, Ordering::Relaxed);
            return;
        }
        let counters = self.rules.entry(rule.name().to_string()).or_default();
        select(&counters).fetch_add(1, Ordering::Relaxed);
    }

    /// Counters of one rule, if it has been evaluated
    #[must_use]
    pub fn get(&self, rule: &str) -> Option<RuleStats> {
        self.rules.get(rule).map(|c| stats(&c))
    }

    /// Counters of every rule, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, RuleStats)> {
        let mut all: Vec<_> = self.rules.iter().map(|e| (e.key().clone(), stats(e.value()))).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn reset(&self) {
        self.rules.clear();
    }
}

fn stats(counters: &RuleCounters) -> RuleStats {
    RuleStats {
        evaluated: counters.evaluated.load(Ordering::Relaxed),
        matched: counters.matched.load(Ordering::Relaxed),
        executed: counters.executed.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
    }
}

impl InterpreterListener for &RuleMetrics {
    fn evaluate_rule(&mut self, rule: &Rule) {
        self.bump(rule, |c| &c.evaluated);
    }

    fn satisfy_rule(&mut self, rule: &Rule) {
        self.bump(rule, |c| &c.matched);
    }

    fn fail_condition(&mut self, rule: &Rule, _error: &EvaluationError) {
        self.bump(rule, |c| &c.failed);
    }

    fn execute_rule(&mut self, rule: &Rule) {
        self.bump(rule, |c| &c.executed);
    }

    fn fail_statement(&mut self, rule: &Rule, _index: usize, _error: &EvaluationError) {
        self.bump(rule, |c| &c.failed);
    }
}
