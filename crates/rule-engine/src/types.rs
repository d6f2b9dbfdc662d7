//! 정적 타입 -- 타입 검사와 함수 시그니처에서 사용하는 값 타입

use std::fmt;

use pipewright_core::value::Value;
use serde::Serialize;

/// 규칙 언어의 정적 타입
///
/// `Any`는 메시지 필드처럼 실행 시점에만 타입이 정해지는 값입니다.
/// `Void`는 값을 만들지 않는 함수의 반환 타입입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Any,
    Void,
    Bool,
    Long,
    Double,
    String,
    List,
    Map,
    Date,
    Period,
    Message,
}

impl ValueType {
    /// 이 타입의 매개변수가 `arg` 타입의 인자를 받을 수 있는지 확인합니다.
    ///
    /// `Double` 매개변수는 `Long` 인자를 받습니다. `Any` 인자는 `Any` 매개변수에만 허용됩니다.
    pub fn accepts(self, arg: ValueType) -> bool {
        match (self, arg) {
            (Self::Any, Self::Void) => false,
            (Self::Any, _) => true,
            (Self::Double, Self::Long) => true,
            (param, arg) => param == arg,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// 실행 시점 값의 타입
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Bool,
            Value::Long(_) => Self::Long,
            Value::Double(_) => Self::Double,
            Value::String(_) => Self::String,
            Value::List(_) => Self::List,
            Value::Map(_) => Self::Map,
            Value::Date(_) => Self::Date,
            Value::Period(_) => Self::Period,
            Value::Message(_) => Self::Message,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
            Self::Date => "date",
            Self::Period => "period",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}
