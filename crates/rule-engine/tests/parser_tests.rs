//! 규칙 언어 통합 테스트 -- 파싱 결과를 실제로 평가해서 의미를 확인합니다.

use std::sync::Arc;

use pipewright_core::message::Message;
use pipewright_core::value::Value;
use pipewright_rule_engine::ast::MatchPolicy;
use pipewright_rule_engine::interpreter::eval;
use pipewright_rule_engine::{EvaluationContext, FunctionRegistry, ParseErrorKind, ParseErrors, RuleParser};

fn parser() -> RuleParser {
    RuleParser::new(Arc::new(FunctionRegistry::with_builtins()))
}

/// `expr`을 평가한 값을 돌려줍니다.
fn evaluate(expr: &str, message: &mut Message) -> Value {
    let source = format!("rule \"eval\" when true then set_field(\"out\", {expr}); end");
    let rule = parser().parse_rule(&source).unwrap_or_else(|e| panic!("{source}\n{e}"));
    let mut ctx = EvaluationContext::new(message);
    eval::execute_statements(&rule, &mut ctx).unwrap();
    message.remove_field("out").unwrap_or(Value::Null)
}

fn value_of(expr: &str) -> Value {
    evaluate(expr, &mut Message::empty())
}

fn parse_errors(source: &str) -> ParseErrors {
    parser().parse_rule(source).unwrap_err()
}

#[test]
fn arithmetic_precedence_and_associativity() {
    assert_eq!(value_of("1 + 2 * 3"), Value::Long(7));
    assert_eq!(value_of("(1 + 2) * 3"), Value::Long(9));
    assert_eq!(value_of("10 - 4 - 3"), Value::Long(3));
    assert_eq!(value_of("17 % 5 + 1"), Value::Long(3));
    assert_eq!(value_of("-2 * 3"), Value::Long(-6));
}

#[test]
fn logical_precedence() {
    assert_eq!(value_of("true || false && false"), Value::Bool(true));
    assert_eq!(value_of("(true || false) && false"), Value::Bool(false));
    assert_eq!(value_of("!false && true"), Value::Bool(true));
    assert_eq!(value_of("not true or true"), Value::Bool(true));
    assert_eq!(value_of("1 + 1 == 2 && 3 > 2"), Value::Bool(true));
}

#[test]
fn keywords_are_case_insensitive() {
    let rule = parser()
        .parse_rule(r#"RULE "loud" WHEN TRUE AND NOT FALSE THEN LET x = 1; END"#)
        .unwrap();
    assert_eq!(rule.name, "loud");

    let pipeline = parser()
        .parse_pipeline(r#"Pipeline "p" Stage 0 Match Either Rule "loud"; End"#)
        .unwrap();
    assert_eq!(pipeline.stages[0].match_policy, MatchPolicy::Either);
}

#[test]
fn comments_are_ignored() {
    let rule = parser()
        .parse_rule(
            r#"// leading comment
            rule "commented" /* inline */
            when
                true // trailing
            then
                /* multi
                   line */
                set_field("a", 1);
            end"#,
        )
        .unwrap();
    assert_eq!(rule.then.len(), 1);
}

#[test]
fn string_escapes_are_decoded() {
    assert_eq!(value_of(r#""a\"b""#), Value::from("a\"b"));
    assert_eq!(value_of(r#""tab\there""#), Value::from("tab\there"));
    assert_eq!(value_of(r#""line\nbreak""#), Value::from("line\nbreak"));
    assert_eq!(value_of(r#""back\\slash""#), Value::from("back\\slash"));
    assert_eq!(value_of(r#""été""#), Value::from("été"));
}

#[test]
fn backtick_identifiers_reach_odd_field_names() {
    let mut message = Message::empty();
    message.add_field("user-name", Value::from("alice"));
    assert_eq!(evaluate("$message.`user-name`", &mut message), Value::from("alice"));
}

#[test]
fn map_and_list_literals_with_indexing() {
    assert_eq!(value_of(r#"["a", "b", "c"][1]"#), Value::from("b"));
    assert_eq!(value_of(r#"{level: "warn", code: 3}["level"]"#), Value::from("warn"));
    assert_eq!(value_of(r#"{inner: {deep: 42}}.inner.deep"#), Value::Long(42));
}

#[test]
fn named_and_positional_calls_are_equivalent() {
    assert_eq!(value_of(r#"concat("a", "b")"#), value_of(r#"concat(second: "b", first: "a")"#));
    assert_eq!(value_of(r#"substring(value: "pipeline", start: 4)"#), Value::from("line"));
}

#[test]
fn let_bindings_feed_later_statements() {
    let mut message = Message::empty();
    message.add_field("raw", Value::from("k1=v1 k2=v2"));
    let rule = parser()
        .parse_rule(
            r#"rule "kv" when true then
                let pairs = key_value(to_string($message.raw));
                set_fields(pairs);
            end"#,
        )
        .unwrap();
    let mut ctx = EvaluationContext::new(&mut message);
    eval::execute_statements(&rule, &mut ctx).unwrap();
    assert_eq!(message.field("k1"), Some(&Value::from("v1")));
    assert_eq!(message.field("k2"), Some(&Value::from("v2")));
}

#[test]
fn error_positions_are_line_and_zero_based_column() {
    let errors = parse_errors("rule \"r\"\nwhen true then\n  nope();\nend");
    assert_eq!(errors.len(), 1);
    let error = &errors.errors()[0];
    assert_eq!((error.line, error.column), (3, 2));
    assert_eq!(error.to_string(), "line 3:2: Unknown function nope");
}

#[test]
fn independent_errors_are_all_reported_in_source_order() {
    let errors = parse_errors(
        r#"rule "r" when true then
            set_field("a", missing_var);
            unknown_fn();
            set_field("b", to_long("1") + "x" * 2);
        end"#,
    );
    let kinds: Vec<&ParseErrorKind> = errors.iter().map(|e| &e.kind).collect();
    assert!(matches!(kinds[0], ParseErrorKind::UndeclaredVariable { name } if name == "missing_var"));
    assert!(matches!(kinds[1], ParseErrorKind::UndeclaredFunction { name } if name == "unknown_fn"));
    assert!(kinds[2..].iter().any(|k| matches!(k, ParseErrorKind::IncompatibleTypes { .. })));

    let lines: Vec<u32> = errors.iter().map(|e| e.line).collect();
    let mut sorted = lines.clone();
    sorted.sort_unstable();
    assert_eq!(lines, sorted);
}

#[test]
fn positional_optional_argument_is_single_error() {
    let errors = parse_errors(r#"rule "r" when true then set_field("x", to_long("1", 5)); end"#);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.errors()[0].kind,
        ParseErrorKind::OptionalParametersMustBeNamed {
            function: "to_long".to_owned()
        }
    );
}

#[test]
fn literal_regex_is_validated_at_parse_time() {
    let errors = parse_errors(
        r#"rule "r" when true then set_field("m", regex("([a-z", to_string($message.msg))); end"#,
    );
    assert!(matches!(
        &errors.errors()[0].kind,
        ParseErrorKind::InvalidFunctionArgument { function, argument, .. }
            if function == "regex" && argument == "pattern"
    ));
}

#[test]
fn unterminated_string_is_a_syntax_error() {
    let errors = parse_errors("rule \"r\" when true then set_field(\"a\", \"open); end");
    assert!(matches!(errors.errors()[0].kind, ParseErrorKind::SyntaxError { .. }));
}

#[test]
fn void_function_cannot_be_an_operand() {
    let errors = parse_errors(r#"rule "r" when true then let x = drop_message() + 1; end"#);
    assert!(matches!(errors.errors()[0].kind, ParseErrorKind::IncompatibleTypes { .. }));
}

#[test]
fn pipeline_stages_are_ordered_by_number() {
    let pipeline = parser()
        .parse_pipeline(
            r#"pipeline "p"
            stage 10 match all rule "late";
            stage -1 match pass rule "early";
            end"#,
        )
        .unwrap();
    let mut numbers: Vec<i32> = pipeline.stages.iter().map(|s| s.number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![-1, 10]);
}

#[test]
fn parse_errors_serialize_with_position() {
    let errors = parse_errors(r#"rule "r" when true then nope(); end"#);
    let json = serde_json::to_value(&errors).unwrap();
    assert_eq!(json[0]["type"], "undeclared_function");
    assert_eq!(json[0]["name"], "nope");
    assert_eq!(json[0]["line"], 1);
}

fn single_syntax_error(source: &str) -> String {
    let errors: Vec<ParseErrorKind> = parse_errors(source).into_iter().map(|e| e.kind).collect();
    assert_eq!(errors.len(), 1, "{errors:?}");
    match &errors[0] {
        ParseErrorKind::SyntaxError { message } => message.clone(),
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn deeply_nested_parentheses_are_rejected() {
    let source = format!(
        "rule \"deep\" when {}true{} then end",
        "(".repeat(10_000),
        ")".repeat(10_000)
    );
    let message = single_syntax_error(&source);
    assert!(message.contains("nested too deeply"), "{message}");
}

#[test]
fn deeply_nested_negation_is_rejected() {
    let source = format!("rule \"deep\" when {}true then end", "!".repeat(10_000));
    assert!(single_syntax_error(&source).contains("nested too deeply"));
}

#[test]
fn long_operator_chains_are_rejected() {
    let source = format!("rule \"deep\" when 1{} > 0 then end", " + 1".repeat(10_000));
    assert!(single_syntax_error(&source).contains("nested too deeply"));

    let source = format!(
        "rule \"deep\" when true then set_field(\"x\", [{}1{}]); end",
        "[".repeat(10_000),
        "]".repeat(10_000)
    );
    assert!(single_syntax_error(&source).contains("nested too deeply"));
}

#[test]
fn moderate_nesting_still_evaluates() {
    let expr = format!("{}1 + 1{}", "(".repeat(100), ")".repeat(100));
    assert_eq!(value_of(&expr), Value::Long(2));
    let chain = format!("0{}", " + 1".repeat(100));
    assert_eq!(value_of(&chain), Value::Long(100));
}
