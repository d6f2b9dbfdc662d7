//! 타입 변환과 타입 검사 함수

use chrono::{DateTime, Utc};
use pipewright_core::value::Value;

use super::dates::parse_timezone;
use super::{
    Builtin, Function, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor,
};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("to_long", ValueType::Long)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(ParameterDescriptor::optional("default", ValueType::Long).default_value(0i64))
                .description("Converts a value to a long, falling back to the default"),
            to_long,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_double", ValueType::Double)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(
                    ParameterDescriptor::optional("default", ValueType::Double).default_value(0.0),
                )
                .description("Converts a value to a double, falling back to the default"),
            to_double,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_string", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(ParameterDescriptor::optional("default", ValueType::String).default_value(""))
                .description("Converts a value to its string representation"),
            to_string,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_bool", ValueType::Bool)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .description("Converts a value to a boolean"),
            to_bool,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_date", ValueType::Date)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .param(ParameterDescriptor::optional("timezone", ValueType::String))
                .description("Converts epoch milliseconds or an ISO-8601 string to a date"),
            to_date,
        )
        .with_validation(|args| match args.get_str("timezone") {
            Some(tz) => parse_timezone(tz).map(|_| ()),
            None => Ok(()),
        }),
    ]
}

/// `is_*` 타입 검사 함수
pub(crate) fn type_checks() -> Vec<TypeCheck> {
    let checks: [(&str, fn(&Value) -> bool); 10] = [
        ("is_null", |v| v.is_null()),
        ("is_not_null", |v| !v.is_null()),
        ("is_string", |v| matches!(v, Value::String(_))),
        ("is_long", |v| matches!(v, Value::Long(_))),
        ("is_double", |v| matches!(v, Value::Double(_))),
        ("is_number", |v| matches!(v, Value::Long(_) | Value::Double(_))),
        ("is_bool", |v| matches!(v, Value::Bool(_))),
        ("is_list", |v| matches!(v, Value::List(_))),
        ("is_map", |v| matches!(v, Value::Map(_))),
        ("is_date", |v| matches!(v, Value::Date(_))),
    ];
    checks
        .into_iter()
        .map(|(name, check)| TypeCheck {
            descriptor: FunctionDescriptor::new(name, ValueType::Bool)
                .param(ParameterDescriptor::required("value", ValueType::Any))
                .description(format!("Returns true when the value passes {name}")),
            check,
        })
        .collect()
}

/// 값 하나에 술어를 적용하는 함수
pub struct TypeCheck {
    descriptor: FunctionDescriptor,
    check: fn(&Value) -> bool,
}

impl Function for TypeCheck {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        args: &FunctionArgs,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, FunctionError> {
        let value = args.get("value").unwrap_or(&Value::Null);
        Ok(Value::Bool((self.check)(value)))
    }
}

fn to_long(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let default = args.optional_long("default")?.unwrap_or(0);
    let converted = match args.get("value") {
        Some(Value::Long(n)) => Some(*n),
        Some(Value::Double(d)) if d.is_finite() => Some(d.trunc() as i64),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|d| d.is_finite()).map(|d| d.trunc() as i64))
        }
        Some(Value::Date(d)) => Some(d.timestamp_millis()),
        _ => None,
    };
    Ok(Value::Long(converted.unwrap_or(default)))
}

fn to_double(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let default = args.get("default").and_then(Value::as_double).unwrap_or(0.0);
    let converted = match args.get("value") {
        Some(Value::Long(n)) => Some(*n as f64),
        Some(Value::Double(d)) => Some(*d),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(Value::Double(converted.unwrap_or(default)))
}

fn to_string(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    match args.get("value") {
        Some(value) => Ok(Value::String(value.to_display_string())),
        None => Ok(Value::String(
            args.optional_str("default")?.unwrap_or_default().to_owned(),
        )),
    }
}

fn to_bool(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let converted = match args.get("value") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Long(n)) => *n != 0,
        Some(Value::Double(d)) => *d != 0.0,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };
    Ok(Value::Bool(converted))
}

fn to_date(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let offset = match args.optional_str("timezone")? {
        Some(tz) => Some(parse_timezone(tz)?),
        None => None,
    };
    let date = match args.get("value") {
        Some(Value::Date(d)) => Some(*d),
        Some(Value::Long(millis)) => DateTime::<Utc>::from_timestamp_millis(*millis),
        Some(Value::String(s)) => parse_iso(s.trim(), offset),
        _ => None,
    };
    Ok(date.map(Value::Date).unwrap_or(Value::Null))
}

/// RFC 3339 또는 오프셋 없는 ISO-8601 날짜 (오프셋이 없으면 `offset` 또는 UTC)
fn parse_iso(s: &str, offset: Option<chrono::FixedOffset>) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .ok()?;
    let offset = match offset {
        Some(offset) => offset,
        None => chrono::FixedOffset::east_opt(0)?,
    };
    naive
        .and_local_timezone(offset)
        .single()
        .map(|d| d.with_timezone(&Utc))
}
