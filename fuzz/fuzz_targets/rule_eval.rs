#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use pipewright_core::message::{DEFAULT_STREAM_ID, Message};
use pipewright_core::value::Value;
use pipewright_rule_engine::{
    Definitions, EngineConfig, FunctionRegistry, InMemoryMetricRegistry, Interpreter,
    NoopInterpreterListener, PipelineResolver, PipelineSource, RuleParser, RuleSource,
};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 규칙 조건식 조각 (최대 4개를 `&&`/`||`로 연결)
    terms: Vec<FuzzTerm>,
    /// `then` 절에서 설정할 값 식
    action: FuzzExpr,
    /// 메시지 필드 `f0..f3`
    fields: Vec<FuzzValue>,
}

#[derive(Arbitrary, Debug)]
struct FuzzTerm {
    left: FuzzExpr,
    op: FuzzOp,
    right: FuzzExpr,
    or: bool,
}

#[derive(Arbitrary, Debug)]
enum FuzzExpr {
    Field(u8),
    Long(i64),
    Double(f64),
    Text(String),
    ToLong(u8),
    ToString(u8),
    Length(u8),
    Regex(String, u8),
    Substring(u8, i64, i64),
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Add,
    Div,
}

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Long(i64),
    Double(f64),
    Text(String),
    Bool(bool),
}

fn quote(s: &str) -> String {
    format!("{s:?}")
}

impl FuzzExpr {
    fn render(&self) -> String {
        let field = |i: &u8| format!("$message.f{}", i % 4);
        match self {
            Self::Field(i) => field(i),
            Self::Long(n) => n.to_string(),
            Self::Double(d) if d.is_finite() => format!("{d:?}"),
            Self::Double(_) => "0.0".to_owned(),
            Self::Text(s) => quote(s),
            Self::ToLong(i) => format!("to_long({})", field(i)),
            Self::ToString(i) => format!("to_string({})", field(i)),
            Self::Length(i) => format!("length(to_string({}))", field(i)),
            Self::Regex(pattern, i) => format!(
                "regex({}, to_string({}))[\"0\"]",
                quote(pattern),
                field(i)
            ),
            Self::Substring(i, start, end) => {
                format!("substring(to_string({}), {start}, {end})", field(i))
            }
        }
    }
}

impl FuzzOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Div => "/",
        }
    }
}

fn parser() -> RuleParser {
    static REGISTRY: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();
    RuleParser::new(Arc::clone(
        REGISTRY.get_or_init(|| Arc::new(FunctionRegistry::with_builtins())),
    ))
}

fuzz_target!(|input: FuzzInput| {
    let mut condition = String::new();
    for (i, term) in input.terms.iter().take(4).enumerate() {
        if i > 0 {
            condition.push_str(if term.or { " || " } else { " && " });
        }
        condition.push_str(&format!(
            "({} {} {})",
            term.left.render(),
            term.op.symbol(),
            term.right.render()
        ));
    }
    if condition.is_empty() {
        condition.push_str("true");
    }

    let mut definitions = Definitions::default();
    definitions.rules.push(RuleSource {
        id: "fuzz".to_owned(),
        title: String::new(),
        source: format!(
            "rule \"fuzz\" when {condition} then set_field(\"out\", {}); end",
            input.action.render()
        ),
    });
    definitions.pipelines.push(PipelineSource {
        id: "p".to_owned(),
        title: String::new(),
        source: "pipeline \"p\" stage 0 match all rule \"fuzz\"; end".to_owned(),
    });
    definitions.connect(DEFAULT_STREAM_ID, "p");

    let resolver = PipelineResolver::new(
        parser(),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );
    // 타입 검사에 걸린 조합은 해석 단계에서 제외될 뿐 크래시는 안 됨
    let Ok(snapshot) = resolver.resolve(&definitions, 1) else {
        return;
    };

    let mut message = Message::empty();
    for (i, value) in input.fields.iter().take(4).enumerate() {
        let value = match value {
            FuzzValue::Long(n) => Value::Long(*n),
            FuzzValue::Double(d) => Value::Double(*d),
            FuzzValue::Text(s) => Value::String(s.clone()),
            FuzzValue::Bool(b) => Value::Bool(*b),
        };
        message.add_field(format!("f{i}"), value);
    }

    let out = Interpreter::new(Arc::new(snapshot)).process(vec![message], &mut NoopInterpreterListener);
    // 평가 에러가 나도 메시지는 사라지지 않음
    assert_eq!(out.len(), 1);
});
