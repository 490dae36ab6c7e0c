//! End-to-end checks of the command implementations against files on disk

use sluice_cli::commands::{self, SimulateTarget};
use sluice_cli::config::SluiceConfig;
use sluice_core::{FunctionRegistry, Intent, PipelineSelection, SimulationOutcome, Value};
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

const RULES: &str = r#"
rule "mark-high"
when has_field("status_code") && to_long($message.status_code) >= 500
then
  set_field("severity", "high");
end

rule "drop-health"
when to_string($message.path) == "/health"
then
  drop_message();
end

rule "route-api"
when starts_with(to_string($message.path), "/api")
then
  route_to_stream("api");
end
"#;

const PIPELINES: &str = r#"
pipeline "main"
stage 0 match pass
  rule "mark-high";
  rule "route-api";
stage 1 match pass
  rule "drop-health";
end
"#;

fn workspace() -> (TempDir, SluiceConfig) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("rules")).unwrap();
    fs::write(dir.path().join("rules/http.rules"), RULES).unwrap();
    fs::write(dir.path().join("main.pipeline"), PIPELINES).unwrap();
    fs::write(
        dir.path().join("sluice.toml"),
        r#"
[engine]
execution_mode = "compiled"
workers = 2

[rules]
files = ["rules/http.rules"]

[pipelines]
files = ["main.pipeline"]
run = ["main"]

[logging]
level = "sluice=debug"
"#,
    )
    .unwrap();
    let config = SluiceConfig::from_file(&dir.path().join("sluice.toml")).unwrap();
    (dir, config)
}

fn registry() -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::with_builtins())
}

#[test]
fn test_config_file_resolves_relative_sources() {
    let (dir, config) = workspace();
    assert_eq!(config.rules.files, vec![dir.path().join("rules/http.rules")]);
    assert_eq!(config.pipelines.files, vec![dir.path().join("main.pipeline")]);
    assert_eq!(config.pipelines.run, vec!["main".to_string()]);
    assert_eq!(config.engine.workers, 2);
    assert_eq!(config.logging.level, "sluice=debug");
    assert_eq!(config.source.as_deref(), Some(dir.path().join("sluice.toml").as_path()));
}

#[test]
fn test_missing_config_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SluiceConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert!(config.source.is_none());
    assert!(config.rules.files.is_empty());
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[engine\nworkers = ").unwrap();
    let err = SluiceConfig::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse configuration file"));
}

#[test]
fn test_check_reports_problems_with_locations() {
    let (dir, config) = workspace();
    let broken = dir.path().join("broken.rules");
    fs::write(
        &broken,
        "rule \"bad\"\nwhen true\nthen\n  nope(1);\nend\n\npipeline \"other\"\nstage 0 match all rule \"ghost\";\nend\n",
    )
    .unwrap();

    let mut files: Vec<_> = config.source_files().cloned().collect();
    let clean = commands::check_sources(&files, &registry()).unwrap();
    assert!(clean.is_clean());
    assert_eq!((clean.rules, clean.pipelines), (3, 1));

    files.push(broken.clone());
    let report = commands::check_sources(&files, &registry()).unwrap();
    let lines: Vec<String> = report.problems.iter().map(ToString::to_string).collect();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with(&broken.display().to_string()));
    assert!(lines[0].contains("4:3"), "{}", lines[0]);
    assert!(lines[0].contains("unknown function 'nope'"));
    assert!(lines[1].contains("unknown rule 'ghost'"));
}

#[test]
fn test_check_reports_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syntax.rules");
    fs::write(&path, "rule \"x\" when true then set_field(\"a\", 1) end").unwrap();
    let report = commands::check_sources(&[path], &registry()).unwrap();
    assert_eq!(report.problems.len(), 1);
    assert!(report.problems[0].message.starts_with("syntax error at 1:"));
}

#[test]
fn test_simulate_rule_from_file() {
    let (dir, config) = workspace();
    let message = commands::parse_message(r#"{"_id": "s1", "path": "/api/users", "status_code": "502"}"#).unwrap();
    let target =
        SimulateTarget::RuleFile { path: dir.path().join("rules/http.rules"), name: Some("route-api".into()) };

    let simulation = commands::simulate(&config, registry(), &target, &message).unwrap();

    assert!(simulation.outcome.matched());
    assert_eq!(simulation.intents, vec![Intent::RouteToStream { stream: "api".into() }]);
    assert!(simulation.message.streams().contains("api"));
    assert!(!simulation.trace.is_empty());
}

#[test]
fn test_simulate_requires_a_rule_name_for_multi_rule_files() {
    let (dir, config) = workspace();
    let target = SimulateTarget::RuleFile { path: dir.path().join("rules/http.rules"), name: None };
    let err = commands::simulate(&config, registry(), &target, &sluice_core::Message::with_id("m")).unwrap_err();
    assert!(err.to_string().contains("--rule-name"));
}

#[test]
fn test_simulate_pipeline_reports_its_outcome() {
    let (_dir, config) = workspace();
    let message = commands::parse_message(r#"{"path": "/health", "status_code": 503}"#).unwrap();
    let simulation =
        commands::simulate(&config, registry(), &SimulateTarget::Pipeline("main".into()), &message).unwrap();

    let SimulationOutcome::Pipeline(outcome) = &simulation.outcome else { panic!("expected a pipeline outcome") };
    assert!(outcome.dropped());
    assert_eq!(simulation.message.field("severity"), Some(&Value::from("high")));

    let json = serde_json::to_value(&simulation).unwrap();
    assert_eq!(json["message"]["severity"], "high");
    assert!(json["trace"].as_array().is_some_and(|t| !t.is_empty()));
}

#[test]
fn test_simulate_unknown_pipeline_fails() {
    let (_dir, config) = workspace();
    let result =
        commands::simulate(&config, registry(), &SimulateTarget::Pipeline("nope".into()), &sluice_core::Message::new());
    assert!(format!("{:#}", result.unwrap_err()).contains("unknown pipeline 'nope'"));
}

#[test]
fn test_process_stream_writes_kept_messages() {
    let (_dir, config) = workspace();
    let processor = commands::processor(&config, registry(), None).unwrap();
    let selection = commands::selection(&[], &config);
    assert_eq!(selection, PipelineSelection::Named(vec!["main".into()]));

    let input = [
        r#"{"_id": "1", "path": "/api/a", "status_code": "500"}"#,
        "",
        r#"{"_id": "2", "path": "/health", "status_code": "200"}"#,
        r#"{"_id": "3", "path": "/other", "status_code": "404"}"#,
    ]
    .join("\n");
    let mut output = Vec::new();
    let summary =
        commands::process_stream(&processor, &selection, Cursor::new(input), &mut output, 2).unwrap();

    assert_eq!((summary.received, summary.emitted, summary.dropped), (3, 2, 1));
    let lines: Vec<serde_json::Value> =
        String::from_utf8(output).unwrap().lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["_id"], "1");
    assert_eq!(lines[0]["severity"], "high");
    assert_eq!(lines[1]["_id"], "3");
    assert!(lines[1].get("severity").is_none());
}

#[test]
fn test_process_stream_rejects_invalid_lines() {
    let (_dir, config) = workspace();
    let processor = commands::processor(&config, registry(), None).unwrap();
    let err = commands::process_stream(
        &processor,
        &PipelineSelection::All,
        Cursor::new("{\"a\": 1}\n[1, 2]\n"),
        &mut Vec::new(),
        10,
    )
    .unwrap_err();
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_function_listing_marks_effects() {
    let mut output = Vec::new();
    commands::list_functions(&registry(), &mut output).unwrap();
    let text = String::from_utf8(output).unwrap();
    assert!(text.lines().any(|l| l.starts_with("to_long(") && !l.contains("[effect]")));
    assert!(text.lines().any(|l| l.starts_with("set_field(") && l.ends_with("[effect]")));
}
