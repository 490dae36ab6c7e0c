//! Parsing and validation of rule sources

use proptest::prelude::*;
use sluice_core::ast::{Expression, Span};
use sluice_core::lexer::Lexer;
use sluice_core::{FunctionRegistry, Type, ValidationError, parse_declarations, parse_rule, validate};

const MARK_HIGH: &str = r#"
rule "mark-high"
when has_field("status_code") && to_long($message.status_code) >= 500
then
  set_field("severity", "high");
end
"#;

fn errors(source: &str) -> Vec<ValidationError> {
    validate(source, &FunctionRegistry::with_builtins()).unwrap_err()
}

#[test]
fn test_mark_high_validates() {
    let rule = validate(MARK_HIGH, &FunctionRegistry::with_builtins()).unwrap();
    assert_eq!(rule.name(), "mark-high");
    assert_eq!(rule.then().len(), 1);
    assert!(rule.source().starts_with("rule \"mark-high\""));
    assert!(rule.source().trim_end().ends_with("end"));
}

#[test]
fn test_symbolic_and_keyword_operators_parse_alike() {
    let symbolic = parse_rule("rule \"a\" when !(true && false) || false then end").unwrap();
    let keywords = parse_rule("rule \"a\" when not (true and false) or false then end").unwrap();
    assert_eq!(symbolic.when.to_string(), keywords.when.to_string());
}

#[test]
fn test_syntax_error_location() {
    let err = parse_rule("rule \"r\"\nwhen true\nthen\n  set_field(\"a\" 1);\nend").unwrap_err();
    assert_eq!(err.span(), Span::new(4, 17));

    match &errors("rule \"r\" when then end")[..] {
        [ValidationError::Syntax(e)] => assert_eq!((e.line, e.column), (1, 15)),
        other => panic!("unexpected errors: {other:?}"),
    }
}

#[test]
fn test_unknown_function_names_call_site() {
    let errs = errors("rule \"r\" when true then\n  frobnicate(1);\nend");
    assert_eq!(errs, vec![ValidationError::UnknownFunction { name: "frobnicate".into(), position: Span::new(2, 3) }]);
}

#[test]
fn test_argument_type_mismatch() {
    let errs = errors("rule \"r\" when true then set_field(1, \"x\"); end");
    assert!(matches!(
        &errs[..],
        [ValidationError::TypeMismatch { expected: Type::String, actual: Type::Long, .. }]
    ));
}

#[test]
fn test_long_widens_to_double_parameter() {
    let registry = FunctionRegistry::with_builtins();
    assert!(validate("rule \"r\" when true then let d = to_double(\"1.5\", 2); end", &registry).is_ok());
}

#[test]
fn test_condition_must_be_boolean() {
    let errs = errors("rule \"r\" when to_long($message.a) then end");
    assert!(matches!(&errs[..], [ValidationError::ConditionNotBoolean { actual: Type::Long, .. }]));
}

#[test]
fn test_variables_are_declared_once_and_in_order() {
    let errs = errors("rule \"r\" when true then set_field(\"a\", later); let later = 1; let later = 2; end");
    assert!(matches!(&errs[0], ValidationError::UndeclaredVariable { name, .. } if name == "later"));
    assert!(matches!(&errs[1], ValidationError::DuplicateVariable { name, .. } if name == "later"));
    assert_eq!(errs.len(), 2);
}

#[test]
fn test_all_errors_are_reported() {
    let errs = errors("rule \"r\" when 1 then nope(); set_field(\"a\", missing); end");
    assert_eq!(errs.len(), 3);
    let positions: Vec<Span> = errs.iter().map(ValidationError::position).collect();
    let mut sorted = positions.clone();
    sorted.sort_by_key(|s| (s.line, s.column));
    assert_eq!(positions, sorted);
}

#[test]
fn test_operator_typing() {
    assert!(matches!(
        &errors("rule \"r\" when $message.a + 1 > 2 then end")[..],
        [ValidationError::InvalidOperator { operator, left: Type::Any, right: Type::Long, .. }] if operator == "+"
    ));
    assert!(matches!(
        &errors("rule \"r\" when \"a\" < 1 then end")[..],
        [ValidationError::InvalidOperator { .. }]
    ));
    assert!(matches!(&errors("rule \"r\" when 1[0] == 1 then end")[..], [ValidationError::NotIndexable { .. }]));

    let registry = FunctionRegistry::with_builtins();
    for ok in [
        "rule \"r\" when \"a\" + \"b\" == \"ab\" then end",
        "rule \"r\" when 1 + 2.5 > 3 then end",
        "rule \"r\" when $message.a == 1 then end",
        "rule \"r\" when [1, 2][0] == 1 and {k: 1}[\"k\"] == 1 then end",
    ] {
        assert!(validate(ok, &registry).is_ok(), "{ok}");
    }
}

#[test]
fn test_declaration_files_mix_rules_and_pipelines() {
    let declarations = parse_declarations(
        r#"
        // enrichment
        rule "a" when true then end
        /* routing */
        PIPELINE "p"
        Stage 1 Match Either
          rule "a";
        END
        "#,
    )
    .unwrap();
    let names: Vec<&str> = declarations.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["a", "p"]);
}

#[test]
fn test_field_refs_render_back_to_source_form() {
    let rule = parse_rule("rule \"r\" when $message[\"user-agent\"] == $message.host then end").unwrap();
    let Expression::BinaryOp { left, right, .. } = &rule.when else { panic!("expected comparison") };
    assert_eq!(left.to_string(), "$message[\"user-agent\"]");
    assert_eq!(right.to_string(), "$message.host");
}

proptest! {
    #[test]
    fn lexer_never_panics(input in "\\PC{0,64}") {
        let _ = Lexer::new(&input).tokenize();
    }

    #[test]
    fn parser_never_panics(input in "(rule|when|then|end|\"x\"|\\$message\\.a|[0-9]{1,3}|[-+*/%()<>=!&|,;\\[\\]{}:. ]){0,24}") {
        let _ = parse_declarations(&input);
    }
}
