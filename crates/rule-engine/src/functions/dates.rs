//! 날짜 함수와 기간 생성 함수
//!
//! 타임존은 `UTC` 또는 고정 오프셋(`+02:00`, `-0530`, `+09`)만 지원합니다.
//! 날짜 패턴은 strftime 형식(`%Y-%m-%d %H:%M:%S`)입니다.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pipewright_core::value::{Period, Value};

use super::{Builtin, ConstantArgs, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: i64 = 7 * MILLIS_PER_DAY;

/// 타임존 문자열을 고정 오프셋으로 변환합니다.
pub(crate) fn parse_timezone(tz: &str) -> Result<FixedOffset, FunctionError> {
    let invalid = || FunctionError::invalid("timezone", format!("unknown timezone '{tz}'"));
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("UTC") || tz.eq_ignore_ascii_case("GMT") || tz == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !matches!(digits.len(), 2 | 4) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = match digits.get(2..) {
        Some(m) if !m.is_empty() => m.parse().map_err(|_| invalid())?,
        _ => 0,
    };
    if hours > 18 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

fn validate_timezone(args: &ConstantArgs) -> Result<(), FunctionError> {
    match args.get_str("timezone") {
        Some(tz) => parse_timezone(tz).map(|_| ()),
        None => Ok(()),
    }
}

fn validate_format(args: &ConstantArgs) -> Result<(), FunctionError> {
    validate_timezone(args)?;
    if let Some(format) = args.get_str("format")
        && StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
    {
        return Err(FunctionError::invalid(
            "format",
            format!("invalid date format '{format}'"),
        ));
    }
    Ok(())
}

fn offset_arg(args: &FunctionArgs) -> Result<FixedOffset, FunctionError> {
    match args.optional_str("timezone")? {
        Some(tz) => parse_timezone(tz),
        None => FixedOffset::east_opt(0).ok_or_else(|| FunctionError::Failed("invalid UTC offset".to_owned())),
    }
}

fn period_builder(name: &'static str, eval: super::EvalFn) -> Builtin {
    Builtin::new(
        FunctionDescriptor::new(name, ValueType::Period)
            .param(ParameterDescriptor::required("value", ValueType::Long))
            .description(format!("A period of `value` {name}")),
        eval,
    )
}

pub(crate) fn builtins() -> Vec<Builtin> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("now", ValueType::Date)
                .param(ParameterDescriptor::optional("timezone", ValueType::String))
                .description("The current instant"),
            |args, _| {
                offset_arg(args)?;
                Ok(Value::Date(Utc::now()))
            },
        )
        .with_validation(validate_timezone),
        Builtin::new(
            FunctionDescriptor::new("parse_date", ValueType::Date)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::optional("timezone", ValueType::String))
                .description("Parses a date with a strftime pattern; values without an offset use `timezone`"),
            parse_date,
        )
        .with_validation(validate_timezone),
        Builtin::new(
            FunctionDescriptor::new("format_date", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::Date))
                .param(ParameterDescriptor::required("format", ValueType::String))
                .param(ParameterDescriptor::optional("timezone", ValueType::String))
                .description("Formats a date with a strftime pattern"),
            format_date,
        )
        .with_validation(validate_format),
        period_builder("years", |args, _| months_period(args, 12)),
        period_builder("months", |args, _| months_period(args, 1)),
        period_builder("weeks", |args, _| millis_period(args, MILLIS_PER_WEEK)),
        period_builder("days", |args, _| millis_period(args, MILLIS_PER_DAY)),
        period_builder("hours", |args, _| millis_period(args, MILLIS_PER_HOUR)),
        period_builder("minutes", |args, _| millis_period(args, MILLIS_PER_MINUTE)),
        period_builder("seconds", |args, _| millis_period(args, MILLIS_PER_SECOND)),
        period_builder("millis", |args, _| millis_period(args, 1)),
    ]
}

fn overflow() -> FunctionError {
    FunctionError::invalid("value", "period out of range")
}

fn months_period(args: &FunctionArgs, factor: i64) -> Result<Value, FunctionError> {
    let months = args
        .required_long("value")?
        .checked_mul(factor)
        .and_then(|m| i32::try_from(m).ok())
        .ok_or_else(overflow)?;
    Ok(Value::Period(Period::months(months)))
}

fn millis_period(args: &FunctionArgs, factor: i64) -> Result<Value, FunctionError> {
    let millis = args
        .required_long("value")?
        .checked_mul(factor)
        .ok_or_else(overflow)?;
    Ok(Value::Period(Period::millis(millis)))
}

fn parse_date(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required_str("value")?.trim();
    let pattern = args.required_str("pattern")?;
    let offset = offset_arg(args)?;

    if let Ok(date) = DateTime::parse_from_str(value, pattern) {
        return Ok(Value::Date(date.with_timezone(&Utc)));
    }
    let naive = NaiveDateTime::parse_from_str(value, pattern)
        .or_else(|_| NaiveDate::parse_from_str(value, pattern).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| {
            FunctionError::invalid("value", format!("'{value}' does not match '{pattern}': {e}"))
        })?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|d| Value::Date(d.with_timezone(&Utc)))
        .ok_or_else(|| FunctionError::invalid("value", format!("'{value}' is not a valid local time")))
}

fn format_date(args: &FunctionArgs, _ctx: &mut EvaluationContext<'_>) -> Result<Value, FunctionError> {
    let value = args.required("value")?;
    let date = value
        .as_date()
        .ok_or_else(|| FunctionError::invalid("value", format!("expected date, got {}", value.type_name())))?;
    let format = args.required_str("format")?;
    let offset = offset_arg(args)?;

    let mut rendered = String::new();
    write!(rendered, "{}", date.with_timezone(&offset).format(format))
        .map_err(|_| FunctionError::invalid("format", format!("invalid date format '{format}'")))?;
    Ok(Value::String(rendered))
}
