//! Compiled rules must behave exactly like interpreted ones

use proptest::prelude::*;
use sluice_core::{FunctionRegistry, Interpreter, Message, Rule, Value, compile, validate};
use std::sync::Arc;

const RULES: &[&str] = &[
    r#"rule "arith" when to_long($message.a) * 3 - to_long($message.b) % 7 > 10
       then set_field("r", to_long($message.a) / to_long($message.b)); end"#,
    r#"rule "mixed" when to_double($message.a) / 2 >= 1.5 or not (to_long($message.b) == 0)
       then let half = to_double($message.a) / 2.0; set_field("half", half); set_field("neg", -half); end"#,
    r#"rule "strings" when contains(to_string($message.s), "x", ignore_case: true)
       then set_field("u", uppercase(to_string($message.s)) + "!"); set_field("len", length(to_string($message.s))); end"#,
    r#"rule "collections" when true then
         let xs = [to_long($message.a), to_long($message.b), 1 + 1];
         let m = {first: xs[0], "second": xs[1]};
         set_field("picked", xs[to_long($message.b) % 3]);
         set_field("m", m["first"]);
         set_field("same", m == {second: xs[1], first: xs[0]});
       end"#,
    r#"rule "short-circuit" when to_long($message.b) != 0 and to_long($message.a) / to_long($message.b) > 1
       then set_field("ok", true); end"#,
    r#"rule "constant" when 1 + 2 * 3 == 7 and uppercase("a") == "A"
       then set_field("c", 10 / 0); set_field("after", substring("hello", 1, 3)); end"#,
    r#"rule "control" when to_long($message.a) > 50 then
         set_field("dropped", true);
         drop_message();
         stop_processing();
       end"#,
];

fn registry() -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::with_builtins())
}

fn rules(registry: &FunctionRegistry) -> Vec<(Rule, Rule)> {
    RULES
        .iter()
        .map(|source| {
            let interpreted = validate(source, registry).unwrap();
            let compiled = compile(&interpreted, registry);
            (interpreted.clone(), interpreted.with_compiled(compiled))
        })
        .collect()
}

fn message(a: i64, b: i64, s: &str) -> Message {
    let mut message = Message::with_id("diff");
    message.set_field("a", Value::Long(a));
    message.set_field("b", Value::String(b.to_string()));
    message.set_field("s", Value::from(s));
    message
}

#[test]
fn test_compiled_rules_carry_their_closures() {
    let registry = registry();
    for (interpreted, compiled) in rules(&registry) {
        assert!(!interpreted.is_compiled());
        assert!(compiled.is_compiled());
        assert_eq!(compiled.compiled().unwrap().statement_count(), compiled.then().len());
    }
}

#[test]
fn test_edge_values_agree() {
    let registry = registry();
    let interpreter = Interpreter::new(registry.clone());
    let pairs = rules(&registry);
    for (a, b) in [(0, 0), (i64::MAX, -1), (i64::MIN, -1), (-7, 3), (51, 0), (10, 10)] {
        for (interpreted, compiled) in &pairs {
            let mut left = message(a, b, "XyZ");
            let mut right = left.clone();
            let expected = interpreter.evaluate(interpreted, &mut left);
            let actual = interpreter.evaluate(compiled, &mut right);
            assert_eq!(expected, actual, "rule {} with a={a} b={b}", interpreted.name());
            assert_eq!(left, right, "rule {} with a={a} b={b}", interpreted.name());
        }
    }
}

proptest! {
    #[test]
    fn interpreted_and_compiled_outcomes_match(a in any::<i64>(), b in -20i64..20, s in "[a-zX ]{0,8}") {
        let registry = registry();
        let interpreter = Interpreter::new(registry.clone());
        for (interpreted, compiled) in rules(&registry) {
            let mut left = message(a, b, &s);
            let mut right = left.clone();
            let expected = interpreter.evaluate(&interpreted, &mut left);
            let actual = interpreter.evaluate(&compiled, &mut right);
            prop_assert_eq!(&expected, &actual);
            prop_assert_eq!(&left, &right);
        }
    }
}
