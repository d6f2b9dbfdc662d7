//! 정적 타입 검사 -- 함수 바인딩, 인자 타입, 연산자 피연산자, 인덱스 접근을 검증합니다.
//!
//! 에러가 난 하위 식은 `None` 타입으로 취급하여 같은 원인에서 파생되는
//! 연쇄 에러를 보고하지 않습니다.

use std::collections::HashMap;

use crate::ast::{Arg, BinaryOp, Call, Expr, ExprKind, Rule, Span, Stmt};
use crate::functions::{ConstantArgs, FunctionError, FunctionRegistry};
use crate::types::ValueType;

use super::error::{ParseError, ParseErrorKind};

pub(crate) struct TypeChecker<'r> {
    registry: &'r FunctionRegistry,
    vars: HashMap<String, ValueType>,
    pub(crate) errors: Vec<ParseError>,
}

impl<'r> TypeChecker<'r> {
    pub(crate) fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            vars: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, kind: ParseErrorKind, span: Span) {
        self.errors.push(ParseError::at(kind, span));
    }

    pub(crate) fn check_rule(&mut self, rule: &mut Rule) {
        self.vars.clear();

        if let Some(ty) = self.check_expr(&mut rule.when)
            && !matches!(ty, ValueType::Bool | ValueType::Any)
        {
            self.error(
                ParseErrorKind::IncompatibleType {
                    expected: ValueType::Bool,
                    actual: ty,
                },
                rule.when.span,
            );
        }

        for stmt in &mut rule.then {
            match stmt {
                Stmt::Let { name, value, .. } => {
                    let ty = self.check_expr(value).unwrap_or(ValueType::Any);
                    self.vars.insert(name.clone(), ty);
                }
                Stmt::Expr(expr) => {
                    self.check_expr(expr);
                }
            }
        }
    }

    /// 식의 타입을 추론하여 `expr.ty`에 기록합니다. 에러가 있었으면 `None`.
    fn check_expr(&mut self, expr: &mut Expr) -> Option<ValueType> {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Bool(_) => Some(ValueType::Bool),
            ExprKind::Long(_) => Some(ValueType::Long),
            ExprKind::Double(_) => Some(ValueType::Double),
            ExprKind::String(_) => Some(ValueType::String),
            ExprKind::Array(items) => {
                let mut ok = true;
                for item in items {
                    ok &= self.check_expr(item).is_some();
                }
                ok.then_some(ValueType::List)
            }
            ExprKind::Map(entries) => {
                let mut ok = true;
                for (_, value) in entries {
                    ok &= self.check_expr(value).is_some();
                }
                ok.then_some(ValueType::Map)
            }
            ExprKind::Var(name) => match self.vars.get(name.as_str()) {
                Some(ty) => Some(*ty),
                None => {
                    let name = name.clone();
                    self.error(ParseErrorKind::UndeclaredVariable { name }, span);
                    None
                }
            },
            ExprKind::MessageField(_) => Some(ValueType::Any),
            ExprKind::Field { object, .. } => match self.check_expr(object)? {
                ValueType::Map | ValueType::Any | ValueType::Date => Some(ValueType::Any),
                actual => {
                    self.error(ParseErrorKind::NonIndexableType { actual }, span);
                    None
                }
            },
            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object);
                let index_ty = self.check_expr(index);
                self.check_index(object_ty?, index_ty?, index.span)
            }
            ExprKind::Call(call) => self.check_call(call, span),
            ExprKind::Not(inner) => match self.check_expr(inner)? {
                ValueType::Bool | ValueType::Any => Some(ValueType::Bool),
                actual => {
                    self.error(
                        ParseErrorKind::IncompatibleType {
                            expected: ValueType::Bool,
                            actual,
                        },
                        inner.span,
                    );
                    None
                }
            },
            ExprKind::Signed { expr: inner, .. } => match self.check_expr(inner)? {
                ty @ (ValueType::Long | ValueType::Double | ValueType::Any) => Some(ty),
                actual => {
                    self.error(
                        ParseErrorKind::IncompatibleType {
                            expected: ValueType::Double,
                            actual,
                        },
                        inner.span,
                    );
                    None
                }
            },
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let left_ty = self.check_expr(left);
                let right_ty = self.check_expr(right);
                let (left_ty, right_ty) = (left_ty?, right_ty?);
                self.check_binary(op, left_ty, left.span, right_ty, right.span, span)
            }
        };
        expr.ty = ty.unwrap_or(ValueType::Any);
        ty
    }

    fn check_index(
        &mut self,
        object: ValueType,
        index: ValueType,
        index_span: Span,
    ) -> Option<ValueType> {
        let expected = match object {
            ValueType::Any => return Some(ValueType::Any),
            ValueType::List => ValueType::Long,
            ValueType::Map => ValueType::String,
            actual => {
                self.error(ParseErrorKind::NonIndexableType { actual }, index_span);
                return None;
            }
        };
        if index == expected || index == ValueType::Any {
            Some(ValueType::Any)
        } else {
            self.error(
                ParseErrorKind::IncompatibleIndexType {
                    expected,
                    actual: index,
                },
                index_span,
            );
            None
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: ValueType,
        left_span: Span,
        right: ValueType,
        right_span: Span,
        span: Span,
    ) -> Option<ValueType> {
        use ValueType as T;

        if left == T::Void || right == T::Void {
            self.error(ParseErrorKind::incompatible_types(op, left, right), span);
            return None;
        }

        match op {
            BinaryOp::And | BinaryOp::Or => {
                let mut ok = true;
                for (ty, at) in [(left, left_span), (right, right_span)] {
                    if !matches!(ty, T::Bool | T::Any) {
                        self.error(
                            ParseErrorKind::IncompatibleType {
                                expected: T::Bool,
                                actual: ty,
                            },
                            at,
                        );
                        ok = false;
                    }
                }
                ok.then_some(T::Bool)
            }
            BinaryOp::Eq | BinaryOp::NotEq => Some(T::Bool),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let comparable = (left.is_numeric() && right.is_numeric())
                    || left == T::Any
                    || right == T::Any
                    || (left == right && matches!(left, T::String | T::Date));
                if comparable {
                    Some(T::Bool)
                } else {
                    self.error(ParseErrorKind::incompatible_types(op, left, right), span);
                    None
                }
            }
            BinaryOp::Add | BinaryOp::Sub => {
                let is_add = op == BinaryOp::Add;
                match (left, right) {
                    (l, r) if l.is_numeric() && r.is_numeric() => Some(numeric_result(l, r)),
                    (T::Any, _) | (_, T::Any) => Some(T::Any),
                    (T::String, T::String) if is_add => Some(T::String),
                    (T::String, T::String) => {
                        self.invalid_operation("Unable to subtract two strings", span)
                    }
                    (T::Date, T::Date) if is_add => {
                        self.invalid_operation("Unable to add two dates", span)
                    }
                    (T::Date, T::Date) => Some(T::Period),
                    (T::Date, T::Period) => Some(T::Date),
                    (T::Period, T::Date) if is_add => Some(T::Date),
                    (T::Period, T::Date) => {
                        self.invalid_operation("Unable to subtract a date from a period", span)
                    }
                    (T::Period, T::Period) => Some(T::Period),
                    _ => {
                        self.error(ParseErrorKind::incompatible_types(op, left, right), span);
                        None
                    }
                }
            }
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (left, right) {
                (l, r) if l.is_numeric() && r.is_numeric() => Some(numeric_result(l, r)),
                (T::Any, _) | (_, T::Any) => Some(T::Any),
                (l, r) if l == r => {
                    let verb = match op {
                        BinaryOp::Mul => "multiply",
                        BinaryOp::Div => "divide",
                        _ => "take the remainder of",
                    };
                    self.invalid_operation(&format!("Unable to {verb} two {l}s"), span)
                }
                _ => {
                    self.error(ParseErrorKind::incompatible_types(op, left, right), span);
                    None
                }
            },
        }
    }

    fn invalid_operation(&mut self, reason: &str, span: Span) -> Option<ValueType> {
        self.error(
            ParseErrorKind::InvalidOperation {
                reason: reason.to_owned(),
            },
            span,
        );
        None
    }

    /// 함수를 바인딩하고 인자를 매개변수 선언 순서의 이름 있는 인자로 정규화합니다.
    fn check_call(&mut self, call: &mut Call, span: Span) -> Option<ValueType> {
        let arg_types: Vec<Option<ValueType>> = call
            .args
            .iter_mut()
            .map(|arg| self.check_expr(&mut arg.value))
            .collect();

        let Some(function) = self.registry.resolve(&call.name) else {
            self.error(
                ParseErrorKind::UndeclaredFunction {
                    name: call.name.clone(),
                },
                span,
            );
            return None;
        };
        let descriptor = function.descriptor();
        let params = descriptor.params();
        let return_type = descriptor.return_type();
        let errors_before = self.errors.len();

        let positional = call.args.iter().take_while(|a| a.name.is_none()).count();
        let required: Vec<usize> = params
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_optional())
            .map(|(i, _)| i)
            .collect();

        // 매개변수 인덱스 -> 인자 인덱스
        let mut bound: Vec<Option<usize>> = vec![None; params.len()];

        if positional > required.len() {
            let kind = if descriptor.has_optional_params() {
                ParseErrorKind::OptionalParametersMustBeNamed {
                    function: call.name.clone(),
                }
            } else {
                ParseErrorKind::WrongNumberOfArgs {
                    function: call.name.clone(),
                    expected: params.len(),
                    actual: call.args.len(),
                }
            };
            self.error(kind, span);
        }
        for (arg_index, param_index) in (0..positional).zip(required.iter().copied()) {
            bound[param_index] = Some(arg_index);
        }

        for (arg_index, arg) in call.args.iter().enumerate().skip(positional) {
            let Some(name) = arg.name.as_deref() else {
                continue;
            };
            match params.iter().position(|p| p.name() == name) {
                None => self.error(
                    ParseErrorKind::InvalidFunctionArgument {
                        function: call.name.clone(),
                        argument: name.to_owned(),
                        reason: "unknown parameter".to_owned(),
                    },
                    arg.value.span,
                ),
                Some(param_index) if bound[param_index].is_some() => self.error(
                    ParseErrorKind::InvalidFunctionArgument {
                        function: call.name.clone(),
                        argument: name.to_owned(),
                        reason: "parameter given more than once".to_owned(),
                    },
                    arg.value.span,
                ),
                Some(param_index) => bound[param_index] = Some(arg_index),
            }
        }

        // 필수 매개변수 누락
        let missing: Vec<usize> = required
            .iter()
            .copied()
            .filter(|&i| bound[i].is_none())
            .collect();
        if !missing.is_empty() && positional <= required.len() {
            if positional == call.args.len() {
                self.error(
                    ParseErrorKind::WrongNumberOfArgs {
                        function: call.name.clone(),
                        expected: if descriptor.has_optional_params() {
                            required.len()
                        } else {
                            params.len()
                        },
                        actual: positional,
                    },
                    span,
                );
            } else {
                for i in missing {
                    self.error(
                        ParseErrorKind::MissingRequiredParam {
                            function: call.name.clone(),
                            parameter: params[i].name().to_owned(),
                        },
                        span,
                    );
                }
            }
        }

        // 인자 타입
        for (param_index, arg_index) in bound.iter().enumerate() {
            let Some(arg_index) = *arg_index else {
                continue;
            };
            let param = &params[param_index];
            if let Some(actual) = arg_types[arg_index]
                && !param.ty().accepts(actual)
            {
                self.error(
                    ParseErrorKind::IncompatibleArgumentType {
                        function: call.name.clone(),
                        parameter: param.name().to_owned(),
                        expected: param.ty(),
                        actual,
                    },
                    call.args[arg_index].value.span,
                );
            }
        }

        if self.errors.len() > errors_before || arg_types.iter().any(Option::is_none) {
            return Some(return_type);
        }

        // 상수 인자 사전 검증
        let constants: ConstantArgs = bound
            .iter()
            .enumerate()
            .filter_map(|(param_index, arg_index)| {
                let value = call.args[(*arg_index)?].value.constant_value()?;
                Some((params[param_index].name().to_owned(), value))
            })
            .collect();
        if let Err(e) = function.validate_constants(&constants) {
            let argument = match &e {
                FunctionError::InvalidArgument { name, .. }
                | FunctionError::MissingArgument(name) => name.clone(),
                FunctionError::Failed(_) => String::new(),
            };
            let reason = match e {
                FunctionError::InvalidArgument { reason, .. } => reason,
                other => other.to_string(),
            };
            self.error(
                ParseErrorKind::InvalidFunctionArgument {
                    function: call.name.clone(),
                    argument,
                    reason,
                },
                span,
            );
            return Some(return_type);
        }

        // 선언 순서의 이름 있는 인자로 정규화
        let mut slots: Vec<Option<Arg>> = std::mem::take(&mut call.args)
            .into_iter()
            .map(Some)
            .collect();
        call.args = bound
            .iter()
            .enumerate()
            .filter_map(|(param_index, arg_index)| {
                let mut arg = slots.get_mut((*arg_index)?)?.take()?;
                arg.name = Some(params[param_index].name().to_owned());
                Some(arg)
            })
            .collect();
        call.function = Some(crate::ast::FunctionRef(function));

        Some(return_type)
    }
}

fn numeric_result(left: ValueType, right: ValueType) -> ValueType {
    if left == ValueType::Long && right == ValueType::Long {
        ValueType::Long
    } else {
        ValueType::Double
    }
}
