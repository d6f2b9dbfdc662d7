//! 규칙 언어 AST
//!
//! 식과 문장은 닫힌 열거형으로 표현되며, 인터프리터는 패턴 매칭으로 평가합니다.
//! 타입 검사를 통과한 AST의 함수 호출은 [`FunctionRef`]로 바인딩되어 있고,
//! 인자는 모두 이름이 붙은 채 선언 순서로 정렬되어 있습니다.

use std::fmt;
use std::sync::Arc;

use pipewright_core::value::Value;

use crate::functions::Function;
use crate::types::ValueType;

/// 소스 위치 (줄은 1부터, 열은 0부터)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// 이항 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 타입 검사 시 바인딩된 함수 구현
#[derive(Clone)]
pub struct FunctionRef(pub Arc<dyn Function>);

impl FunctionRef {
    pub fn name(&self) -> &str {
        self.0.descriptor().name()
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionRef({})", self.name())
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// 함수 호출 인자
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    /// 이름 있는 인자의 매개변수명. 타입 검사 이후에는 항상 채워집니다.
    pub name: Option<String>,
    pub value: Expr,
}

/// 함수 호출
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
    pub function: Option<FunctionRef>,
}

/// 식 종류
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    /// `let`으로 바인딩된 변수
    Var(String),
    /// `$message.field`
    MessageField(String),
    /// `object.field`
    Field { object: Box<Expr>, field: String },
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    Call(Call),
    Not(Box<Expr>),
    Signed { negative: bool, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// 위치와 추론된 타입을 가진 식
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: ValueType,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: ValueType::Any,
        }
    }

    /// 리터럴만으로 이루어진 식이면 값을 계산합니다.
    ///
    /// 파싱 시점의 인자 검증(`validate_constants`)에 사용됩니다.
    pub fn constant_value(&self) -> Option<Value> {
        match &self.kind {
            ExprKind::Bool(b) => Some(Value::Bool(*b)),
            ExprKind::Long(n) => Some(Value::Long(*n)),
            ExprKind::Double(d) => Some(Value::Double(*d)),
            ExprKind::String(s) => Some(Value::String(s.clone())),
            ExprKind::Array(items) => items
                .iter()
                .map(Expr::constant_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            ExprKind::Map(entries) => entries
                .iter()
                .map(|(k, v)| v.constant_value().map(|v| (k.clone(), v)))
                .collect::<Option<_>>()
                .map(Value::Map),
            ExprKind::Signed { negative, expr } => match expr.constant_value()? {
                Value::Long(n) if *negative => n.checked_neg().map(Value::Long),
                Value::Double(d) if *negative => Some(Value::Double(-d)),
                v @ (Value::Long(_) | Value::Double(_)) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    /// 식 트리를 전위 순회합니다.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Array(items) => items.iter().for_each(|e| e.walk(visit)),
            ExprKind::Map(entries) => entries.iter().for_each(|(_, e)| e.walk(visit)),
            ExprKind::Field { object, .. } => object.walk(visit),
            ExprKind::Index { object, index } => {
                object.walk(visit);
                index.walk(visit);
            }
            ExprKind::Call(call) => call.args.iter().for_each(|a| a.value.walk(visit)),
            ExprKind::Not(inner) | ExprKind::Signed { expr: inner, .. } => inner.walk(visit),
            ExprKind::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            _ => {}
        }
    }
}

/// 규칙 본문의 문장
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr, span: Span },
    Expr(Expr),
}

/// 파싱된 규칙
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// 저장소 ID (소스에서 파싱한 경우 `None`)
    pub id: Option<String>,
    pub name: String,
    pub when: Expr,
    pub then: Vec<Stmt>,
}

impl Rule {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// 메트릭과 로그에 사용하는 식별자 (ID가 없으면 이름)
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// 규칙 안에서 호출하는 함수 이름 (중복 제거, 등장 순서)
    pub fn called_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut collect = |e: &Expr| {
            if let ExprKind::Call(call) = &e.kind
                && !names.contains(&call.name)
            {
                names.push(call.name.clone());
            }
        };
        self.when.walk(&mut collect);
        for stmt in &self.then {
            match stmt {
                Stmt::Let { value, .. } => value.walk(&mut collect),
                Stmt::Expr(e) => e.walk(&mut collect),
            }
        }
        names
    }
}

/// 스테이지 매칭 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPolicy {
    /// 모든 규칙이 매칭되어야 함
    All,
    /// 하나 이상의 규칙이 매칭되면 충분
    Either,
    /// 결과와 무관하게 항상 다음 스테이지로 진행
    Pass,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Either => write!(f, "either"),
            Self::Pass => write!(f, "pass"),
        }
    }
}

/// 파이프라인 소스에 선언된 스테이지
#[derive(Debug, Clone, PartialEq)]
pub struct StageDecl {
    pub number: i32,
    pub match_policy: MatchPolicy,
    pub rule_names: Vec<String>,
    pub span: Span,
}

/// 파싱된 파이프라인 선언 (스테이지는 번호 오름차순)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDecl {
    pub id: Option<String>,
    pub name: String,
    pub stages: Vec<StageDecl>,
}

impl PipelineDecl {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}
