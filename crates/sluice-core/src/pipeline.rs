//! Pipelines and stages

use crate::ast::{PipelineDecl, StageMatch};
use crate::error::PipelineError;
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the outcomes of a stage's rule conditions combine into stage pass/fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchPolicy {
    /// Every rule's condition must hold
    All,
    /// At least one condition must hold; an empty stage passes
    Any,
}

impl MatchPolicy {
    #[must_use]
    pub const fn is_satisfied(self, matched: usize, total: usize) -> bool {
        match self {
            Self::All => matched == total,
            Self::Any => total == 0 || matched > 0,
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
        }
    }
}

/// An ordered group of rules sharing a match policy
#[derive(Debug, Clone)]
pub struct Stage {
    order: i32,
    policy: MatchPolicy,
    gate: bool,
    rules: Vec<Arc<Rule>>,
}

impl Stage {
    /// A stage; a failed `gate` stage ends the pipeline for the message
    #[must_use]
    pub fn new(order: i32, policy: MatchPolicy, gate: bool, rules: Vec<Arc<Rule>>) -> Self {
        Self { order, policy, gate, rules }
    }

    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub const fn policy(&self) -> MatchPolicy {
        self.policy
    }

    #[must_use]
    pub const fn is_gate(&self) -> bool {
        self.gate
    }

    /// Rules in authored order
    #[must_use]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }
}

/// A named, ordered sequence of stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline, ordering stages by number
    ///
    /// # Errors
    ///
    /// `DuplicateStage` if two stages share a number.
    pub fn new(name: impl Into<String>, mut stages: Vec<Stage>) -> Result<Self, PipelineError> {
        let name = name.into();
        stages.sort_by_key(Stage::order);
        if let Some(pair) = stages.windows(2).find(|w| w[0].order == w[1].order) {
            return Err(PipelineError::DuplicateStage { pipeline: name, order: pair[0].order });
        }
        Ok(Self { name, stages })
    }

    /// Resolve a parsed declaration against the admitted rules
    ///
    /// # Errors
    ///
    /// `UnknownRule` for the first reference `lookup` cannot satisfy,
    /// `DuplicateStage` for repeated stage numbers.
    pub fn resolve(
        decl: &PipelineDecl,
        lookup: impl Fn(&str) -> Option<Arc<Rule>>,
    ) -> Result<Self, PipelineError> {
        let mut stages = Vec::with_capacity(decl.stages.len());
        for stage in &decl.stages {
            let rules = stage
                .rules
                .iter()
                .map(|r| {
                    lookup(&r.name).ok_or_else(|| PipelineError::UnknownRule {
                        pipeline: decl.name.clone(),
                        rule: r.name.clone(),
                        position: r.span,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (policy, gate) = match stage.matching {
                StageMatch::All => (MatchPolicy::All, true),
                StageMatch::Any => (MatchPolicy::Any, true),
                StageMatch::Pass => (MatchPolicy::Any, false),
            };
            stages.push(Stage::new(stage.order, policy, gate, rules));
        }
        Self::new(decl.name.clone(), stages)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in increasing order
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Names of every rule referenced by the pipeline
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().flat_map(|s| s.rules.iter().map(|r| r.name()))
    }
}
