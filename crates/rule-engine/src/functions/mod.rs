//! 함수 레지스트리 -- 규칙에서 호출할 수 있는 타입이 있는 함수 모음
//!
//! 모든 함수는 [`Function`] 트레이트를 구현하고 [`FunctionDescriptor`]로
//! 이름, 반환 타입, 매개변수를 선언합니다. 파서는 디스크립터로 호출을 바인딩하고
//! 인터프리터는 [`Function::evaluate`]를 호출합니다.
//!
//! # 아키텍처
//! - [`conversion`]: 타입 변환 및 타입 검사 (`to_long`, `is_string` 등)
//! - [`message`]: 메시지 필드/스트림/메타데이터 조작
//! - [`strings`]: 문자열 처리와 정규식
//! - [`encoding`]: 해시와 base16/base64 인코딩
//! - [`dates`]: 날짜 파싱/포맷, 기간 생성
//! - [`lookup`]: 외부 조회 테이블

pub mod conversion;
pub mod dates;
pub mod encoding;
pub mod lookup;
pub mod message;
pub mod strings;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pipewright_core::value::{MessageHandle, Value};
use serde::Serialize;

use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

pub use lookup::{InMemoryLookupTables, LookupTables};

/// 함수 평가 에러
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FunctionError {
    /// 필수 인자가 없거나 null
    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    /// 인자 값이 유효하지 않음
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// 기타 평가 실패
    #[error("{0}")]
    Failed(String),
}

impl FunctionError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

/// 매개변수 선언
#[derive(Debug, Clone, Serialize)]
pub struct ParameterDescriptor {
    name: String,
    #[serde(rename = "type")]
    ty: ValueType,
    optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            default: None,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, ty)
        }
    }

    /// 인자가 생략되었을 때 사용할 값
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// 함수 선언
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDescriptor {
    name: String,
    return_type: ValueType,
    params: Vec<ParameterDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, return_type: ValueType) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: Vec::new(),
            description: None,
        }
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> ValueType {
        self.return_type
    }

    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    pub fn has_optional_params(&self) -> bool {
        self.params.iter().any(ParameterDescriptor::is_optional)
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// `name(a: string, b: long = 0) -> string` 형태의 시그니처
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match (&p.default, p.optional) {
                (Some(d), _) => format!("{}: {} = {d}", p.name, p.ty),
                (None, true) => format!("{}?: {}", p.name, p.ty),
                (None, false) => format!("{}: {}", p.name, p.ty),
            })
            .collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.return_type)
    }
}

/// 파싱 시점에 알려진 리터럴 인자
#[derive(Debug, Clone, Default)]
pub struct ConstantArgs(BTreeMap<String, Value>);

impl ConstantArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

impl FromIterator<(String, Value)> for ConstantArgs {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 평가된 인자 (생략된 선택 인자는 기본값으로 채워짐)
#[derive(Debug, Clone, Default)]
pub struct FunctionArgs {
    values: Vec<(String, Value)>,
}

impl FunctionArgs {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    /// 디스크립터 기준으로 기본값을 채웁니다.
    pub fn with_defaults(mut self, descriptor: &FunctionDescriptor) -> Self {
        for param in descriptor.params() {
            if let Some(default) = param.default()
                && !self.values.iter().any(|(n, _)| n == param.name())
            {
                self.values.push((param.name().to_owned(), default.clone()));
            }
        }
        self
    }

    /// null이 아닌 인자 값
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub fn required(&self, name: &str) -> Result<&Value, FunctionError> {
        self.get(name)
            .ok_or_else(|| FunctionError::MissingArgument(name.to_owned()))
    }

    pub fn required_str(&self, name: &str) -> Result<&str, FunctionError> {
        let value = self.required(name)?;
        value
            .as_str()
            .ok_or_else(|| type_mismatch(name, ValueType::String, value))
    }

    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, FunctionError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| type_mismatch(name, ValueType::String, value)),
        }
    }

    pub fn required_long(&self, name: &str) -> Result<i64, FunctionError> {
        let value = self.required(name)?;
        value
            .as_long()
            .ok_or_else(|| type_mismatch(name, ValueType::Long, value))
    }

    pub fn optional_long(&self, name: &str) -> Result<Option<i64>, FunctionError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_long()
                .map(Some)
                .ok_or_else(|| type_mismatch(name, ValueType::Long, value)),
        }
    }

    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>, FunctionError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| type_mismatch(name, ValueType::Bool, value)),
        }
    }

    pub fn required_list(&self, name: &str) -> Result<&[Value], FunctionError> {
        let value = self.required(name)?;
        value
            .as_list()
            .ok_or_else(|| type_mismatch(name, ValueType::List, value))
    }

    pub fn required_map(&self, name: &str) -> Result<&BTreeMap<String, Value>, FunctionError> {
        let value = self.required(name)?;
        value
            .as_map()
            .ok_or_else(|| type_mismatch(name, ValueType::Map, value))
    }

    /// 메시지 인자. 생략되면 현재 메시지입니다.
    pub fn message(&self, name: &str) -> Result<MessageHandle, FunctionError> {
        match self.get(name) {
            None => Ok(MessageHandle::Current),
            Some(value) => value
                .as_message()
                .ok_or_else(|| type_mismatch(name, ValueType::Message, value)),
        }
    }
}

fn type_mismatch(name: &str, expected: ValueType, actual: &Value) -> FunctionError {
    FunctionError::invalid(
        name,
        format!("expected {expected}, got {}", actual.type_name()),
    )
}

/// 규칙에서 호출할 수 있는 함수
pub trait Function: Send + Sync + 'static {
    fn descriptor(&self) -> &FunctionDescriptor;

    /// 리터럴 인자를 파싱 시점에 검증합니다.
    fn validate_constants(&self, _args: &ConstantArgs) -> Result<(), FunctionError> {
        Ok(())
    }

    fn evaluate(
        &self,
        args: &FunctionArgs,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, FunctionError>;
}

type EvalFn = fn(&FunctionArgs, &mut EvaluationContext<'_>) -> Result<Value, FunctionError>;
type ValidateFn = fn(&ConstantArgs) -> Result<(), FunctionError>;

/// 상태가 없는 내장 함수
pub struct Builtin {
    descriptor: FunctionDescriptor,
    eval: EvalFn,
    validate: Option<ValidateFn>,
}

impl Builtin {
    pub fn new(descriptor: FunctionDescriptor, eval: EvalFn) -> Self {
        Self {
            descriptor,
            eval,
            validate: None,
        }
    }

    pub fn with_validation(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }
}

impl Function for Builtin {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn validate_constants(&self, args: &ConstantArgs) -> Result<(), FunctionError> {
        match self.validate {
            Some(validate) => validate(args),
            None => Ok(()),
        }
    }

    fn evaluate(
        &self,
        args: &FunctionArgs,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, FunctionError> {
        (self.eval)(args, ctx)
    }
}

/// 이름 → 함수 구현 맵
///
/// 프로세스 시작 시 구성된 뒤에는 `Arc`로 공유되며 변경되지 않습니다.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    /// 빈 레지스트리
    pub fn new() -> Self {
        Self::default()
    }

    /// 모든 내장 함수가 등록된 레지스트리
    ///
    /// `lookup_value`는 빈 인메모리 조회 테이블로 등록됩니다.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in conversion::builtins()
            .into_iter()
            .chain(message::builtins())
            .chain(strings::builtins())
            .chain(encoding::builtins())
            .chain(dates::builtins())
        {
            registry.register(builtin);
        }
        for check in conversion::type_checks() {
            registry.register(check);
        }
        registry.register(lookup::LookupValue::new(Arc::new(
            InMemoryLookupTables::default(),
        )));
        registry
    }

    /// `lookup_value`가 사용할 조회 테이블을 교체합니다.
    pub fn with_lookup_tables(mut self, tables: Arc<dyn LookupTables>) -> Self {
        self.register(lookup::LookupValue::new(tables));
        self
    }

    /// 함수를 등록합니다. 같은 이름이 있으면 교체합니다.
    pub fn register(&mut self, function: impl Function) {
        self.register_arc(Arc::new(function));
    }

    pub fn register_arc(&mut self, function: Arc<dyn Function>) {
        let name = function.descriptor().name().to_owned();
        if self.functions.insert(name.clone(), function).is_some() {
            tracing::debug!(function = %name, "replaced registered function");
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// 이름순으로 정렬된 디스크립터 목록
    pub fn descriptors(&self) -> Vec<&FunctionDescriptor> {
        let mut descriptors: Vec<_> = self.functions.values().map(|f| f.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name().cmp(b.name()));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
