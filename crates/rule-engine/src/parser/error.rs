//! 파싱 에러 -- 위치가 붙은 구조화된 에러와 에러 묶음
//!
//! 파서는 첫 에러에서 멈추지 않고 독립적인 에러를 모두 모아 [`ParseErrors`]로 반환합니다.
//! 표시 형식 `line L:C: 메시지`는 규칙 편집기가 의존하는 계약입니다.

use std::fmt;

use serde::Serialize;

use crate::ast::{BinaryOp, Span};
use crate::types::ValueType;

/// 파싱 에러 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParseErrorKind {
    /// 문법 위반
    SyntaxError { message: String },
    /// 등록되지 않은 함수 호출
    UndeclaredFunction { name: String },
    /// 선언되지 않은 변수 참조
    UndeclaredVariable { name: String },
    /// 함수 인자 타입 불일치
    IncompatibleArgumentType {
        function: String,
        parameter: String,
        expected: ValueType,
        actual: ValueType,
    },
    /// 인덱스 타입 불일치 (리스트에 문자열 인덱스 등)
    IncompatibleIndexType { expected: ValueType, actual: ValueType },
    /// 인덱싱할 수 없는 타입
    NonIndexableType { actual: ValueType },
    /// 이항 연산자 피연산자 타입 불일치
    IncompatibleTypes {
        op: String,
        left: ValueType,
        right: ValueType,
    },
    /// 단항 연산자 피연산자 또는 조건식 타입 불일치
    IncompatibleType { expected: ValueType, actual: ValueType },
    /// 타입은 맞지만 허용되지 않는 연산 (날짜 + 날짜 등)
    InvalidOperation { reason: String },
    /// 선택 매개변수를 위치 인자로 전달
    OptionalParametersMustBeNamed { function: String },
    /// 파싱 시점에 검증되는 상수 인자가 유효하지 않음
    InvalidFunctionArgument {
        function: String,
        argument: String,
        reason: String,
    },
    /// 위치 인자 개수 불일치
    WrongNumberOfArgs {
        function: String,
        expected: usize,
        actual: usize,
    },
    /// 이름 있는 호출에서 필수 매개변수 누락
    MissingRequiredParam { function: String, parameter: String },
    /// 파이프라인 안에서 같은 스테이지 번호가 중복됨
    DuplicateStage { pipeline: String, stage: i32 },
}

impl ParseErrorKind {
    pub(crate) fn incompatible_types(op: BinaryOp, left: ValueType, right: ValueType) -> Self {
        Self::IncompatibleTypes {
            op: op.symbol().to_owned(),
            left,
            right,
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError { message } => write!(f, "{message}"),
            Self::UndeclaredFunction { name } => write!(f, "Unknown function {name}"),
            Self::UndeclaredVariable { name } => {
                write!(f, "Undeclared variable {name}")
            }
            Self::IncompatibleArgumentType {
                function,
                parameter,
                expected,
                actual,
            } => write!(
                f,
                "Expected type {expected} for argument {parameter} but found {actual} in call to function {function}"
            ),
            Self::IncompatibleIndexType { expected, actual } => {
                write!(f, "Expected type {expected} but found {actual} when indexing")
            }
            Self::NonIndexableType { actual } => {
                write!(f, "Cannot index value of type {actual}")
            }
            Self::IncompatibleTypes { op, left, right } => write!(
                f,
                "Incompatible types {left} {op} {right}"
            ),
            Self::IncompatibleType { expected, actual } => {
                write!(f, "Expected type {expected} but found {actual}")
            }
            Self::InvalidOperation { reason } => write!(f, "{reason}"),
            Self::OptionalParametersMustBeNamed { function } => write!(
                f,
                "Function {function} has optional parameters, must use named parameters to call"
            ),
            Self::InvalidFunctionArgument {
                function,
                argument,
                reason,
            } => write!(
                f,
                "Unable to pre-compute value for argument {argument} in call to function {function}: {reason}"
            ),
            Self::WrongNumberOfArgs {
                function,
                expected,
                actual,
            } => write!(
                f,
                "Expected {expected} arguments but found {actual} in call to function {function}"
            ),
            Self::MissingRequiredParam {
                function,
                parameter,
            } => write!(
                f,
                "Missing required parameter {parameter} in call to function {function}"
            ),
            Self::DuplicateStage { pipeline, stage } => {
                write!(f, "Duplicate stage {stage} in pipeline {pipeline}")
            }
        }
    }
}

/// 위치가 붙은 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    #[serde(flatten)]
    pub kind: ParseErrorKind,
    /// 줄 (1부터)
    pub line: u32,
    /// 열 (0부터)
    pub column: u32,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, line: u32, column: u32) -> Self {
        Self { kind, line, column }
    }

    pub fn at(kind: ParseErrorKind, span: Span) -> Self {
        Self::new(kind, span.line, span.column)
    }

    pub(crate) fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::at(
            ParseErrorKind::SyntaxError {
                message: message.into(),
            },
            span,
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{}: {}", self.line, self.column, self.kind)
    }
}

impl std::error::Error for ParseError {}

/// 한 소스에서 수집된 파싱 에러 묶음 (항상 하나 이상)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParseErrors(Vec<ParseError>);

impl ParseErrors {
    pub fn new(errors: Vec<ParseError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<ParseError> {
        self.0
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_has_line_and_column() {
        let err = ParseError::syntax("mismatched input 'x' expecting 'then'", Span::new(3, 7));
        assert_eq!(
            err.to_string(),
            "line 3:7: mismatched input 'x' expecting 'then'"
        );
    }

    #[test]
    fn errors_join_with_newlines() {
        let errors = ParseErrors::new(vec![
            ParseError::new(
                ParseErrorKind::UndeclaredVariable {
                    name: "x".to_owned(),
                },
                1,
                0,
            ),
            ParseError::new(
                ParseErrorKind::UndeclaredFunction {
                    name: "f".to_owned(),
                },
                2,
                4,
            ),
        ]);
        let text = errors.to_string();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("line 2:4: Unknown function f"));
    }

    #[test]
    fn error_serializes_with_kind_tag() {
        let err = ParseError::new(
            ParseErrorKind::OptionalParametersMustBeNamed {
                function: "substring".to_owned(),
            },
            1,
            5,
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "optional_parameters_must_be_named");
        assert_eq!(json["line"], 1);
        assert_eq!(json["function"], "substring");
    }
}
