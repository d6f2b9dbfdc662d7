//! 메시지 모델 -- 규칙이 읽고 변경하는 가변 엔티티
//!
//! [`Message`]는 필드 맵, 스트림 멤버십, 메타데이터 사이드 채널을 가집니다.
//! 메타데이터는 직렬화되지 않으며, 출력 필터가 목적지 상태를 인터프리터에
//! 전달하고 돌려받는 용도로 사용합니다.
//!
//! # 예약 필드
//! `_id`, `message`, `source`, `timestamp`는 제거할 수 없습니다.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MessageError;
use crate::value::Value;

/// 스트림이 없는 메시지가 속하는 기본 스트림 ID
pub const DEFAULT_STREAM_ID: &str = "000000000000000000000001";

pub const FIELD_ID: &str = "_id";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_SOURCE: &str = "source";
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// 처리 에러가 누적되는 필드
pub const FIELD_PROCESSING_ERROR: &str = "gl2_processing_error";

const RESERVED_FIELDS: &[&str] = &[FIELD_ID, FIELD_MESSAGE, FIELD_SOURCE, FIELD_TIMESTAMP];

/// 규칙 평가 중 발생한 처리 에러
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingError {
    /// 에러 분류 (예: `rule_condition_evaluation`, `rule_execution`)
    pub cause: String,
    /// 사람이 읽을 수 있는 상세
    pub details: String,
}

/// 처리 중인 로그 메시지
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: String,
    fields: BTreeMap<String, Value>,
    streams: BTreeSet<String>,
    #[serde(skip)]
    metadata: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    filter_out: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processing_errors: Vec<ProcessingError>,
}

impl Message {
    /// 본문, 소스, 타임스탬프로 새 메시지를 생성합니다.
    pub fn new(message: impl Into<String>, source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut msg = Self::empty();
        msg.fields.insert(FIELD_MESSAGE.to_owned(), Value::String(message.into()));
        msg.fields.insert(FIELD_SOURCE.to_owned(), Value::String(source.into()));
        msg.fields.insert(FIELD_TIMESTAMP.to_owned(), Value::Date(timestamp));
        msg
    }

    /// 필드가 없는 메시지를 생성합니다.
    pub fn empty() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fields: BTreeMap::new(),
            streams: BTreeSet::new(),
            metadata: BTreeMap::new(),
            filter_out: false,
            processing_errors: Vec::new(),
        }
    }

    /// ID를 지정합니다.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // --- 필드 ---

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// 필드를 설정합니다.
    ///
    /// 유효하지 않은 필드명이거나 값이 `Null`이면 무시하고 `false`를 반환합니다.
    pub fn add_field(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if !is_valid_field_name(&name) {
            tracing::debug!(field = %name, message_id = %self.id, "ignoring invalid field name");
            return false;
        }
        if value.is_null() {
            return false;
        }
        self.fields.insert(name, value);
        true
    }

    /// 여러 필드를 설정합니다. 실제로 설정된 필드 수를 반환합니다.
    pub fn add_fields(&mut self, fields: impl IntoIterator<Item = (String, Value)>) -> usize {
        fields
            .into_iter()
            .filter(|(name, value)| self.add_field(name.clone(), value.clone()))
            .count()
    }

    /// 필드를 제거합니다. 예약 필드는 제거되지 않습니다.
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        if RESERVED_FIELDS.contains(&name) {
            return None;
        }
        self.fields.remove(name)
    }

    /// 필드 이름을 변경합니다. 원본이 없거나 이름이 같으면 `false`.
    pub fn rename_field(&mut self, old: &str, new: &str) -> bool {
        if old == new || !is_valid_field_name(new) || RESERVED_FIELDS.contains(&old) {
            return false;
        }
        match self.fields.remove(old) {
            Some(value) => {
                self.fields.insert(new.to_owned(), value);
                true
            }
            None => false,
        }
    }

    // --- 스트림 ---

    pub fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    /// 스트림에 추가합니다. 새로 추가되었으면 `true`.
    pub fn add_stream(&mut self, stream_id: impl Into<String>) -> bool {
        self.streams.insert(stream_id.into())
    }

    pub fn remove_stream(&mut self, stream_id: &str) -> bool {
        self.streams.remove(stream_id)
    }

    // --- 메타데이터 사이드 채널 ---

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    // --- 드롭 / 처리 에러 ---

    pub fn is_filtered_out(&self) -> bool {
        self.filter_out
    }

    pub fn set_filter_out(&mut self, filter_out: bool) {
        self.filter_out = filter_out;
    }

    pub fn add_processing_error(&mut self, cause: impl Into<String>, details: impl Into<String>) {
        self.processing_errors.push(ProcessingError {
            cause: cause.into(),
            details: details.into(),
        });
    }

    pub fn processing_errors(&self) -> &[ProcessingError] {
        &self.processing_errors
    }

    /// 누적된 처리 에러를 `gl2_processing_error` 필드에 줄 단위로 기록하고 비웁니다.
    pub fn flush_processing_errors(&mut self) {
        if self.processing_errors.is_empty() {
            return;
        }
        let mut lines: Vec<String> = match self.fields.get(FIELD_PROCESSING_ERROR) {
            Some(Value::String(existing)) if !existing.is_empty() => vec![existing.clone()],
            _ => Vec::new(),
        };
        lines.extend(self.processing_errors.drain(..).map(|e| e.details));
        self.fields.insert(
            FIELD_PROCESSING_ERROR.to_owned(),
            Value::String(lines.join("\n")),
        );
    }

    /// 필드와 스트림을 복사한 새 메시지를 만듭니다. ID는 새로 발급됩니다.
    pub fn duplicate(&self) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fields: self.fields.clone(),
            streams: self.streams.clone(),
            metadata: BTreeMap::new(),
            filter_out: false,
            processing_errors: Vec::new(),
        }
    }

    /// JSON에서 메시지를 생성합니다.
    ///
    /// `{"id": .., "fields": {..}, "streams": [..]}` 형식 또는
    /// 모든 키를 필드로 취급하는 평면 객체를 받습니다.
    pub fn from_json(json: serde_json::Value) -> Result<Self, MessageError> {
        let serde_json::Value::Object(mut object) = json else {
            return Err(MessageError::InvalidJson(
                "top-level value must be an object".to_owned(),
            ));
        };

        let mut message = Self::empty();
        let structured = matches!(object.get("fields"), Some(serde_json::Value::Object(_)));
        if !structured {
            for (name, value) in object {
                message.add_field(name, Value::from_json(value));
            }
            return Ok(message);
        }

        if let Some(id) = object.remove("id") {
            match id {
                serde_json::Value::String(id) => message.id = id,
                other => {
                    return Err(MessageError::InvalidJson(format!(
                        "id must be a string, got {other}"
                    )));
                }
            }
        }
        if let Some(serde_json::Value::Object(fields)) = object.remove("fields") {
            for (name, value) in fields {
                message.add_field(name, Value::from_json(value));
            }
        }
        if let Some(streams) = object.remove("streams") {
            let serde_json::Value::Array(streams) = streams else {
                return Err(MessageError::InvalidJson(
                    "streams must be an array of strings".to_owned(),
                ));
            };
            for stream in streams {
                match stream {
                    serde_json::Value::String(id) => {
                        message.add_stream(id);
                    }
                    other => {
                        return Err(MessageError::InvalidJson(format!(
                            "stream id must be a string, got {other}"
                        )));
                    }
                }
            }
        }
        Ok(message)
    }
}

/// 필드명 규칙: 비어 있지 않고 `[A-Za-z0-9_.\-@]`로만 구성
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '@'))
}
