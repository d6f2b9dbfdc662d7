//! 조회 테이블과 `lookup_value` 함수

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pipewright_core::value::Value;

use super::{Function, FunctionArgs, FunctionDescriptor, FunctionError, ParameterDescriptor};
use crate::interpreter::EvaluationContext;
use crate::types::ValueType;

/// 이름이 있는 키-값 테이블 모음
///
/// 구현체는 자체적으로 타임아웃을 적용해야 합니다. 인터프리터는 조회를 기다리기만 합니다.
pub trait LookupTables: Send + Sync + 'static {
    /// 테이블이 없으면 `Err`, 키가 없으면 `Ok(None)`
    fn lookup(&self, table: &str, key: &str) -> Result<Option<Value>, FunctionError>;
}

/// 메모리 내 테이블 (테이블 이름 → 키 → 값)
#[derive(Debug, Default)]
pub struct InMemoryLookupTables {
    tables: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl InMemoryLookupTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// 테이블 전체를 교체합니다.
    pub fn insert_table(&self, name: impl Into<String>, entries: HashMap<String, Value>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(name.into(), entries);
        }
    }

    pub fn insert(&self, table: &str, key: impl Into<String>, value: Value) {
        if let Ok(mut tables) = self.tables.write() {
            tables
                .entry(table.to_owned())
                .or_default()
                .insert(key.into(), value);
        }
    }
}

impl LookupTables for InMemoryLookupTables {
    fn lookup(&self, table: &str, key: &str) -> Result<Option<Value>, FunctionError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| FunctionError::Failed("lookup table lock poisoned".to_owned()))?;
        let entries = tables
            .get(table)
            .ok_or_else(|| FunctionError::invalid("table", format!("unknown lookup table '{table}'")))?;
        Ok(entries.get(key).cloned())
    }
}

/// `lookup_value(table, key, default:)`
pub struct LookupValue {
    descriptor: FunctionDescriptor,
    tables: Arc<dyn LookupTables>,
}

impl LookupValue {
    pub fn new(tables: Arc<dyn LookupTables>) -> Self {
        Self {
            descriptor: FunctionDescriptor::new("lookup_value", ValueType::Any)
                .param(ParameterDescriptor::required("table", ValueType::String))
                .param(ParameterDescriptor::required("key", ValueType::Any))
                .param(ParameterDescriptor::optional("default", ValueType::Any))
                .description("Looks up a single value in a lookup table"),
            tables,
        }
    }
}

impl Function for LookupValue {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        args: &FunctionArgs,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, FunctionError> {
        let table = args.required_str("table")?;
        let key = args.required("key")?.to_display_string();
        let found = self.tables.lookup(table, &key)?;
        Ok(found
            .or_else(|| args.get("default").cloned())
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::message::Message;

    fn evaluate(function: &LookupValue, args: Vec<(&str, Value)>) -> Result<Value, FunctionError> {
        let mut message = Message::empty();
        let mut ctx = EvaluationContext::new(&mut message);
        let args = FunctionArgs::new(args.into_iter().map(|(k, v)| (k.to_owned(), v)).collect());
        function.evaluate(&args, &mut ctx)
    }

    #[test]
    fn finds_values_and_falls_back_to_default() {
        let tables = Arc::new(InMemoryLookupTables::new());
        tables.insert("ports", "443", "https".into());
        let function = LookupValue::new(tables);

        assert_eq!(
            evaluate(&function, vec![("table", "ports".into()), ("key", Value::Long(443))]).unwrap(),
            Value::from("https")
        );
        assert_eq!(
            evaluate(
                &function,
                vec![("table", "ports".into()), ("key", "22".into()), ("default", "unknown".into())]
            )
            .unwrap(),
            Value::from("unknown")
        );
        assert_eq!(
            evaluate(&function, vec![("table", "ports".into()), ("key", "22".into())]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn unknown_table_is_an_error() {
        let function = LookupValue::new(Arc::new(InMemoryLookupTables::new()));
        assert!(evaluate(&function, vec![("table", "nope".into()), ("key", "k".into())]).is_err());
    }
}
