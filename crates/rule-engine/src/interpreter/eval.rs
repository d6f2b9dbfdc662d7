//! 트리 순회 평가기
//!
//! 타입 검사를 통과한 AST를 값으로 평가합니다. `Any` 타입 값(메시지 필드 등)은
//! 여기서 실제 타입을 확인합니다.
//!
//! - 산술 연산은 피연산자 중 하나라도 `Null`이면 `Null`
//! - 비교 연산은 피연산자 중 하나라도 `Null`이면 `false`
//! - 논리 연산은 `Null`을 `false`로 취급
//! - `Long` 산술은 오버플로를 검사

use chrono::Datelike as _;
use chrono::Timelike as _;
use pipewright_core::value::{Period, Value};

use super::context::{EvalError, EvaluationContext};
use crate::ast::{BinaryOp, Call, Expr, ExprKind, Rule, Span, Stmt};
use crate::functions::FunctionArgs;

/// 규칙 조건을 평가합니다. `Null`은 불일치입니다.
pub fn eval_condition(rule: &Rule, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvalError> {
    match eval_expr(&rule.when, ctx)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(EvalError::expression(
            rule.when.span,
            format!("condition evaluated to {} instead of bool", other.type_name()),
        )),
    }
}

/// 규칙 액션을 순서대로 실행합니다. 첫 에러에서 멈춥니다.
pub fn execute_statements(rule: &Rule, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
    for stmt in &rule.then {
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = eval_expr(value, ctx)?;
                ctx.define(name.clone(), value);
            }
            Stmt::Expr(expr) => {
                eval_expr(expr, ctx)?;
            }
        }
    }
    Ok(())
}

pub fn eval_expr(expr: &Expr, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
    let span = expr.span;
    match &expr.kind {
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Long(n) => Ok(Value::Long(*n)),
        ExprKind::Double(d) => Ok(Value::Double(*d)),
        ExprKind::String(s) => Ok(Value::String(s.clone())),
        ExprKind::Array(items) => items
            .iter()
            .map(|item| eval_expr(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        ExprKind::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval_expr(value, ctx)?);
            }
            Ok(Value::Map(map))
        }
        ExprKind::Var(name) => Ok(ctx.variable(name).cloned().unwrap_or(Value::Null)),
        ExprKind::MessageField(name) => Ok(ctx.message().field(name).cloned().unwrap_or(Value::Null)),
        ExprKind::Field { object, field } => {
            let object = eval_expr(object, ctx)?;
            field_access(object, field, span)
        }
        ExprKind::Index { object, index } => {
            let object = eval_expr(object, ctx)?;
            let index = eval_expr(index, ctx)?;
            index_access(object, index, span)
        }
        ExprKind::Call(call) => eval_call(call, span, ctx),
        ExprKind::Not(inner) => match eval_expr(inner, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Bool(true)),
            other => Err(type_error(span, "!", &other)),
        },
        ExprKind::Signed { negative, expr: inner } => match (eval_expr(inner, ctx)?, *negative) {
            (value, false) => Ok(value),
            (Value::Long(n), true) => n
                .checked_neg()
                .map(Value::Long)
                .ok_or_else(|| EvalError::expression(span, "integer overflow")),
            (Value::Double(d), true) => Ok(Value::Double(-d)),
            (Value::Null, true) => Ok(Value::Null),
            (other, true) => Err(type_error(span, "-", &other)),
        },
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                if !truthy(eval_expr(left, ctx)?, left.span)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(eval_expr(right, ctx)?, right.span)?))
            }
            BinaryOp::Or => {
                if truthy(eval_expr(left, ctx)?, left.span)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(eval_expr(right, ctx)?, right.span)?))
            }
            _ => {
                let l = eval_expr(left, ctx)?;
                let r = eval_expr(right, ctx)?;
                binary(*op, l, r, span)
            }
        },
    }
}

fn eval_call(call: &Call, span: Span, ctx: &mut EvaluationContext<'_>) -> Result<Value, EvalError> {
    let Some(function) = &call.function else {
        return Err(EvalError::expression(
            span,
            format!("function '{}' is not bound", call.name),
        ));
    };
    let mut values = Vec::with_capacity(call.args.len());
    for (position, arg) in call.args.iter().enumerate() {
        let value = eval_expr(&arg.value, ctx)?;
        // 파서가 인자를 이름 있는 형태로 정규화하지만, 직접 만든 AST를 위해 위치로 대체합니다.
        let name = match &arg.name {
            Some(name) => name.clone(),
            None => function
                .0
                .descriptor()
                .params()
                .get(position)
                .map(|p| p.name().to_owned())
                .unwrap_or_default(),
        };
        values.push((name, value));
    }
    let args = FunctionArgs::new(values).with_defaults(function.0.descriptor());
    function
        .0
        .evaluate(&args, ctx)
        .map_err(|source| EvalError::Function {
            function: call.name.clone(),
            span,
            source,
        })
}

fn truthy(value: Value, span: Span) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(EvalError::expression(
            span,
            format!("expected bool, got {}", other.type_name()),
        )),
    }
}

fn type_error(span: Span, op: &str, value: &Value) -> EvalError {
    EvalError::expression(
        span,
        format!("operator '{op}' cannot be applied to {}", value.type_name()),
    )
}

fn field_access(object: Value, field: &str, span: Span) -> Result<Value, EvalError> {
    match object {
        Value::Null => Ok(Value::Null),
        Value::Map(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
        Value::Date(date) => {
            let value = match field {
                "year" => i64::from(date.year()),
                "month" | "month_of_year" => i64::from(date.month()),
                "day" | "day_of_month" => i64::from(date.day()),
                "day_of_week" => i64::from(date.weekday().number_from_monday()),
                "day_of_year" => i64::from(date.ordinal()),
                "hour" | "hour_of_day" => i64::from(date.hour()),
                "minute" | "minute_of_hour" => i64::from(date.minute()),
                "second" | "second_of_minute" => i64::from(date.second()),
                "millis" | "millis_of_second" => i64::from(date.timestamp_subsec_millis()),
                "epoch_millis" | "millis_of_epoch" => date.timestamp_millis(),
                _ => {
                    return Err(EvalError::expression(
                        span,
                        format!("date has no property '{field}'"),
                    ));
                }
            };
            Ok(Value::Long(value))
        }
        other => Err(EvalError::expression(
            span,
            format!("cannot read field '{field}' of {}", other.type_name()),
        )),
    }
}

fn index_access(object: Value, index: Value, span: Span) -> Result<Value, EvalError> {
    match (object, index) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::List(mut items), Value::Long(i)) => {
            let len = items.len();
            usize::try_from(i)
                .ok()
                .filter(|&i| i < len)
                .map(|i| items.swap_remove(i))
                .ok_or_else(|| {
                    EvalError::expression(span, format!("index {i} out of bounds for list of length {len}"))
                })
        }
        (Value::Map(mut map), Value::String(key)) => Ok(map.remove(&key).unwrap_or(Value::Null)),
        (object, index) => Err(EvalError::expression(
            span,
            format!("cannot index {} with {}", object.type_name(), index.type_name()),
        )),
    }
}

/// 숫자 간 동등성은 타입을 넘나들어 비교합니다.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Long(l), Value::Double(r)) => (*l as f64) == *r,
        (Value::Double(l), Value::Long(r)) => *l == (*r as f64),
        (l, r) => l == r,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    use BinaryOp as B;

    match op {
        B::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        B::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
        B::Lt | B::Le | B::Gt | B::Ge => compare(op, &left, &right, span),
        B::And | B::Or => Err(EvalError::expression(span, "logical operator evaluated eagerly")),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        _ => arithmetic(op, left, right, span),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value, span: Span) -> Result<Value, EvalError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(Value::Bool(false)),
        (Value::Long(l), Value::Long(r)) => Some(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Date(l), Value::Date(r)) => Some(l.cmp(r)),
        (l, r) => match (l.as_double(), r.as_double()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => {
                return Err(EvalError::expression(
                    span,
                    format!(
                        "cannot compare {} {op} {}",
                        left.type_name(),
                        right.type_name()
                    ),
                ));
            }
        },
    };
    let result = match ordering {
        None => false,
        Some(ordering) => match op {
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Le => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        },
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    use BinaryOp as B;

    let overflow = || EvalError::expression(span, "integer overflow");
    let mismatch = |left: &Value, right: &Value| {
        EvalError::expression(
            span,
            format!(
                "operator '{op}' cannot be applied to {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
    };

    match (&left, &right) {
        (Value::Long(l), Value::Long(r)) => {
            let (l, r) = (*l, *r);
            let result = match op {
                B::Add => l.checked_add(r),
                B::Sub => l.checked_sub(r),
                B::Mul => l.checked_mul(r),
                B::Div | B::Rem if r == 0 => {
                    return Err(EvalError::expression(span, "division by zero"));
                }
                B::Div => l.checked_div(r),
                _ => l.checked_rem(r),
            };
            result.map(Value::Long).ok_or_else(overflow)
        }
        (Value::Long(_) | Value::Double(_), Value::Long(_) | Value::Double(_)) => {
            let (Some(l), Some(r)) = (left.as_double(), right.as_double()) else {
                return Err(mismatch(&left, &right));
            };
            let result = match op {
                B::Add => l + r,
                B::Sub => l - r,
                B::Mul => l * r,
                B::Div => l / r,
                _ => l % r,
            };
            Ok(Value::Double(result))
        }
        (Value::String(l), Value::String(r)) if op == B::Add => Ok(Value::String(format!("{l}{r}"))),
        (Value::Date(l), Value::Date(r)) if op == B::Sub => Ok(Value::Period(Period::between(*r, *l))),
        (Value::Date(date), Value::Period(period)) if matches!(op, B::Add | B::Sub) => {
            let period = if op == B::Sub { period.negated() } else { *period };
            period
                .add_to(*date)
                .map(Value::Date)
                .ok_or_else(|| EvalError::expression(span, "date out of range"))
        }
        (Value::Period(period), Value::Date(date)) if op == B::Add => period
            .add_to(*date)
            .map(Value::Date)
            .ok_or_else(|| EvalError::expression(span, "date out of range")),
        (Value::Period(l), Value::Period(r)) if matches!(op, B::Add | B::Sub) => {
            let r = if op == B::Sub { r.negated() } else { *r };
            Ok(Value::Period(l.plus(r)))
        }
        _ => Err(mismatch(&left, &right)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use pipewright_core::message::Message;

    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::parser::RuleParser;

    fn parser() -> RuleParser {
        RuleParser::new(Arc::new(FunctionRegistry::with_builtins()))
    }

    /// `let result = <expr>;`를 실행하고 `result` 값을 반환합니다.
    fn eval(source: &str, message: &mut Message) -> Result<Value, EvalError> {
        let rule = parser()
            .parse_rule(&format!("rule \"t\" when true then let result = {source}; end"))
            .unwrap();
        let mut ctx = EvaluationContext::new(message);
        execute_statements(&rule, &mut ctx)?;
        Ok(ctx.variable("result").cloned().unwrap_or(Value::Null))
    }

    fn value(source: &str) -> Value {
        eval(source, &mut Message::empty()).unwrap()
    }

    #[test]
    fn arithmetic_with_numeric_promotion() {
        assert_eq!(value("1 + 2 * 3"), Value::Long(7));
        assert_eq!(value("7 / 2"), Value::Long(3));
        assert_eq!(value("7 % 4"), Value::Long(3));
        assert_eq!(value("1 + 0.5"), Value::Double(1.5));
        assert_eq!(value("-(2 - 5)"), Value::Long(3));
        assert_eq!(value("\"a\" + \"b\""), Value::from("ab"));
    }

    #[test]
    fn overflow_and_division_by_zero_are_errors() {
        let mut message = Message::empty();
        assert!(eval("9223372036854775807 + 1", &mut message).is_err());
        let err = eval("1 / 0", &mut message).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn null_propagation() {
        let mut message = Message::empty();
        assert_eq!(eval("$message.missing + 1", &mut message).unwrap(), Value::Null);
        assert_eq!(eval("$message.missing > 1", &mut message).unwrap(), Value::Bool(false));
        assert_eq!(eval("!$message.missing", &mut message).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("$message.missing && true", &mut message).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn equality_crosses_numeric_types() {
        assert_eq!(value("1 == 1.0"), Value::Bool(true));
        assert_eq!(value("\"a\" != \"b\""), Value::Bool(true));
    }

    #[test]
    fn runtime_type_mismatch_on_message_fields() {
        let mut message = Message::empty();
        message.add_field("s", "text".into());
        let err = eval("$message.s * 2", &mut message).unwrap_err();
        assert!(matches!(err, EvalError::Expression { .. }));
        assert!(eval("$message.s > 1", &mut message).is_err());
    }

    #[test]
    fn short_circuit_skips_failing_right_side() {
        let mut message = Message::empty();
        message.add_field("s", "text".into());
        assert_eq!(
            eval("false && $message.s * 2 == 1", &mut message).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn index_and_field_access() {
        assert_eq!(value("[1, 2, 3][1]"), Value::Long(2));
        assert_eq!(value("{a: 1}[\"a\"]"), Value::Long(1));
        assert_eq!(value("{a: {b: 2}}.a.b"), Value::Long(2));
        assert_eq!(value("{a: 1}.missing"), Value::Null);
        assert!(eval("[1][5]", &mut Message::empty()).is_err());
    }

    #[test]
    fn date_and_period_arithmetic() {
        let mut message = Message::empty();
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        message.add_field("ts", Value::Date(start));
        assert_eq!(
            eval("$message.ts + months(1)", &mut message).unwrap(),
            Value::Date(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
        assert_eq!(
            eval("$message.ts - hours(1)", &mut message).unwrap(),
            Value::Date(Utc.with_ymd_and_hms(2024, 1, 30, 23, 0, 0).unwrap())
        );
        assert_eq!(eval("$message.ts.year", &mut message).unwrap(), Value::Long(2024));
        assert_eq!(
            eval("($message.ts + days(2)) - $message.ts", &mut message).unwrap(),
            Value::Period(Period::millis(2 * 86_400_000))
        );
    }

    #[test]
    fn function_errors_carry_position() {
        let err = eval("base16_decode(\"zz\")", &mut Message::empty()).unwrap_err();
        let EvalError::Function { function, span, .. } = &err else {
            panic!("expected function error")
        };
        assert_eq!(function, "base16_decode");
        assert_eq!(span.line, 1);
        assert!(err.to_string().starts_with("In call to function 'base16_decode' at 1:"));
    }

    #[test]
    fn conditions_treat_null_as_false() {
        let rule = parser()
            .parse_rule(r#"rule "r" when $message.flag then end"#)
            .unwrap();
        let mut message = Message::empty();
        let mut ctx = EvaluationContext::new(&mut message);
        assert!(!eval_condition(&rule, &mut ctx).unwrap());
        ctx.message_mut().add_field("flag", Value::Bool(true));
        assert!(eval_condition(&rule, &mut ctx).unwrap());
        ctx.message_mut().add_field("flag", Value::Long(1));
        assert!(eval_condition(&rule, &mut ctx).is_err());
    }
}
