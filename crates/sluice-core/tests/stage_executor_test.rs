//! Stage policies, gating and multi-pipeline processing

use sluice_core::{
    ConfigurationBuilder, ConfigurationSnapshot, FunctionRegistry, MatchPolicy, Message, NoopListener, Pipeline,
    Stage, StageExecutor, StageFailure, Terminal, Value,
};
use std::sync::Arc;

const RULES: &str = r#"
rule "yes" when true then set_field("yes", true); end
rule "no" when false then set_field("no", true); end
rule "mark" when true then set_field("marked", to_long($message.marked, default: 0) + 1); end
rule "tag-a" when true then set_field("tag", "a"); end
rule "reads-tag" when to_string($message.tag) == "a" then set_field("saw_tag", true); end
rule "drop" when true then drop_message(); end
rule "stop" when true then stop_processing(); end
"#;

fn snapshot(pipelines: &str) -> ConfigurationSnapshot {
    let mut builder = ConfigurationBuilder::new(Arc::new(FunctionRegistry::with_builtins()));
    builder.add_source(RULES).add_source(pipelines);
    let (snapshot, report) = builder.build();
    assert!(report.is_clean(), "{:?}", report.rejected);
    snapshot
}

fn run(snapshot: &ConfigurationSnapshot, pipeline: &str, message: &mut Message) -> sluice_core::PipelineOutcome {
    let pipeline = snapshot.pipeline(pipeline).unwrap();
    snapshot.executor().run_pipeline(pipeline, message)
}

#[test]
fn test_all_policy_fails_when_one_rule_does_not_match() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 0 match all rule "yes"; rule "no";
        stage 1 match all rule "mark";
        end"#,
    );
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    assert_eq!(
        outcome.terminal,
        Terminal::GateFailed {
            failure: StageFailure { pipeline: "p".into(), stage: 0, policy: MatchPolicy::All, matched: 1, total: 2 }
        }
    );
    assert_eq!(outcome.stages.len(), 1);
    assert!(!message.has_field("marked"));
    // actions of matching rules still ran in the failed stage
    assert_eq!(message.field("yes"), Some(&Value::Boolean(true)));
}

#[test]
fn test_any_policy_passes_when_one_rule_matches() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 0 match either rule "yes"; rule "no";
        stage 1 match all rule "mark";
        end"#,
    );
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    assert_eq!(outcome.terminal, Terminal::Completed);
    assert!(outcome.stages[0].passed);
    assert_eq!(outcome.stages[0].matched(), 1);
    assert_eq!(message.field("marked"), Some(&Value::Long(1)));
}

#[test]
fn test_pass_stage_never_halts() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 0 match pass rule "no";
        stage 1 match all rule "mark";
        end"#,
    );
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    assert!(!outcome.stages[0].passed);
    assert_eq!(outcome.terminal, Terminal::Completed);
    assert_eq!(message.field("marked"), Some(&Value::Long(1)));
}

#[test]
fn test_stages_run_in_numeric_order() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 10 match all rule "reads-tag";
        stage -5 match all rule "tag-a";
        end"#,
    );
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    assert_eq!(outcome.stages.iter().map(|s| s.order).collect::<Vec<_>>(), vec![-5, 10]);
    assert_eq!(message.field("saw_tag"), Some(&Value::Boolean(true)));
}

#[test]
fn test_conditions_see_the_message_as_the_stage_began() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 0 match all rule "tag-a"; rule "reads-tag";
        stage 1 match all rule "mark";
        end"#,
    );
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    let stage = &outcome.stages[0];
    assert!(!stage.passed);
    assert!(stage.rules[0].matched);
    assert!(!stage.rules[1].matched);
    assert!(matches!(outcome.terminal, Terminal::GateFailed { .. }));
    // tag-a's action ran, but after reads-tag's condition was decided
    assert_eq!(message.field("tag"), Some(&Value::from("a")));
    assert!(!message.has_field("saw_tag"));
    assert!(!message.has_field("marked"));
}

#[test]
fn test_actions_see_earlier_actions_in_the_stage() {
    let snapshot = snapshot(
        r#"pipeline "p"
        stage 0 match all rule "mark"; rule "mark";
        end"#,
    );
    let mut message = Message::with_id("m");
    run(&snapshot, "p", &mut message);
    assert_eq!(message.field("marked"), Some(&Value::Long(2)));
}

#[test]
fn test_empty_stage_passes_any_and_all() {
    let pipeline = Pipeline::new(
        "empty",
        vec![Stage::new(0, MatchPolicy::Any, true, vec![]), Stage::new(1, MatchPolicy::All, true, vec![])],
    )
    .unwrap();
    let executor = StageExecutor::new(sluice_core::Interpreter::new(Arc::new(FunctionRegistry::with_builtins())));
    let outcome = executor.run_pipeline(&pipeline, &mut Message::with_id("m"));
    assert_eq!(outcome.terminal, Terminal::Completed);
    assert_eq!(outcome.stages.len(), 2);
}

#[test]
fn test_drop_only_marks_the_message() {
    let snapshot = snapshot(
        r#"
        pipeline "a-dropper" stage 0 match all rule "drop"; rule "mark"; stage 1 match all rule "mark"; end
        pipeline "b-marker" stage 0 match all rule "mark"; end
        "#,
    );
    let pipelines: Vec<_> = snapshot.pipelines().cloned().collect();
    let mut message = Message::with_id("m");
    let outcomes = snapshot.executor().process(pipelines.iter().map(|p| &**p), &mut message, &mut NoopListener);

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].terminal, Terminal::Completed);
    assert_eq!(outcomes[0].stages.len(), 2);
    assert!(outcomes[0].dropped());
    assert_eq!(outcomes[1].terminal, Terminal::Completed);
    assert!(!outcomes[1].dropped());
    assert!(message.is_dropped());
    assert_eq!(message.field("marked"), Some(&Value::Long(3)));
}

#[test]
fn test_stop_processing_only_ends_the_current_pipeline() {
    let snapshot = snapshot(
        r#"
        pipeline "a-stopper" stage 0 match all rule "stop"; stage 1 match all rule "mark"; end
        pipeline "b-marker" stage 0 match all rule "mark"; end
        "#,
    );
    let pipelines: Vec<_> = snapshot.pipelines().cloned().collect();
    let mut message = Message::with_id("m");
    let outcomes = snapshot.executor().process(pipelines.iter().map(|p| &**p), &mut message, &mut NoopListener);

    assert_eq!(outcomes[0].terminal, Terminal::Stopped { stage: 0 });
    assert_eq!(outcomes[1].terminal, Terminal::Completed);
    assert_eq!(message.field("marked"), Some(&Value::Long(1)));
}

#[test]
fn test_condition_errors_count_as_unmatched_in_policies() {
    let mut builder = ConfigurationBuilder::new(Arc::new(FunctionRegistry::with_builtins()));
    builder.add_source(
        r#"
        rule "fails" when to_long($message.n) / 0 == 1 then end
        rule "yes" when true then end
        pipeline "p" stage 0 match any rule "fails"; rule "yes"; stage 1 match all rule "fails"; end
        "#,
    );
    let (snapshot, _) = builder.build();
    let mut message = Message::with_id("m");
    let outcome = run(&snapshot, "p", &mut message);

    assert!(outcome.stages[0].passed);
    assert!(matches!(outcome.terminal, Terminal::GateFailed { .. }));
    assert_eq!(outcome.errors().count(), 2);
    assert_eq!(
        message.field("processing_error"),
        Some(&Value::from("For rule 'fails': division by zero, For rule 'fails': division by zero"))
    );
}
