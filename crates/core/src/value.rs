//! 규칙 언어 런타임 값
//!
//! [`Value`]는 메시지 필드, 규칙 변수, 함수 인자/반환값이 공유하는 단일 값 표현입니다.
//! JSON으로 표현 가능한 값은 `serde_json::Value`와 손실 없이 상호 변환됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Months, SecondsFormat, TimeDelta, Utc};
use serde::{Serialize, Serializer};

/// 평가 중인 메시지를 가리키는 핸들
///
/// `Current`는 현재 처리 중인 메시지, `Created(n)`은 같은 평가 안에서
/// `create_message`/`clone_message`로 만들어진 n번째 메시지입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageHandle {
    Current,
    Created(usize),
}

/// 달력 기간 (월 단위 + 밀리초 단위)
///
/// 월은 달력 연산(말일 보정)으로, 밀리초는 정확한 시간 간격으로 더해집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    pub months: i32,
    pub millis: i64,
}

impl Period {
    pub const fn months(months: i32) -> Self {
        Self { months, millis: 0 }
    }

    pub const fn millis(millis: i64) -> Self {
        Self { months: 0, millis }
    }

    /// 두 시각 사이의 기간 (`end - start`)
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::millis((end - start).num_milliseconds())
    }

    pub fn plus(self, other: Period) -> Self {
        Self {
            months: self.months.saturating_add(other.months),
            millis: self.millis.saturating_add(other.millis),
        }
    }

    pub fn negated(self) -> Self {
        Self {
            months: self.months.saturating_neg(),
            millis: self.millis.saturating_neg(),
        }
    }

    /// 시각에 기간을 더합니다. 범위를 벗어나면 `None`.
    pub fn add_to(self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let shifted = if self.months >= 0 {
            date.checked_add_months(Months::new(self.months.unsigned_abs()))?
        } else {
            date.checked_sub_months(Months::new(self.months.unsigned_abs()))?
        };
        shifted.checked_add_signed(TimeDelta::try_milliseconds(self.millis)?)
    }
}

impl fmt::Display for Period {
    /// ISO-8601 형태 (`P1Y2MT3.5S`)로 출력합니다.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.millis == 0 {
            return write!(f, "PT0S");
        }
        write!(f, "P")?;
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            write!(f, "{years}Y")?;
        }
        if months != 0 {
            write!(f, "{months}M")?;
        }
        if self.millis != 0 {
            let secs = self.millis / 1000;
            let frac = (self.millis % 1000).abs();
            if frac == 0 {
                write!(f, "T{secs}S")?;
            } else {
                let sign = if self.millis < 0 && secs == 0 { "-" } else { "" };
                write!(f, "T{sign}{secs}.{frac:03}S")?;
            }
        }
        Ok(())
    }
}

/// 규칙 언어 런타임 값
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Date(DateTime<Utc>),
    Period(Period),
    Message(MessageHandle),
}

impl Value {
    /// 진단 메시지용 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Date(_) => "date",
            Self::Period(_) => "period",
            Self::Message(_) => "message",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Long은 Double로 확장됩니다.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Long(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<MessageHandle> {
        match self {
            Self::Message(handle) => Some(*handle),
            _ => None,
        }
    }

    /// `to_string`/`concat` 등에서 쓰는 문자열 표현
    ///
    /// 문자열은 따옴표 없이, 나머지는 JSON 표현으로 변환합니다.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Long(n) => n.to_string(),
            Self::Double(d) => d.to_string(),
            Self::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Period(p) => p.to_string(),
            Self::Message(_) => "<message>".to_owned(),
            Self::List(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }

    /// JSON 값에서 변환합니다. 정수는 Long, 그 외 숫자는 Double이 됩니다.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(long) => Self::Long(long),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON 값으로 변환합니다. 날짜는 RFC 3339 문자열, 기간은 ISO-8601 문자열이 됩니다.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Long(n) => serde_json::Value::from(*n),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Date(_) | Self::Period(_) | Self::Message(_) => {
                serde_json::Value::String(self.to_display_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_display_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Period> for Value {
    fn from(p: Period) -> Self {
        Self::Period(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn json_integers_become_longs() {
        let value = Value::from_json(serde_json::json!({"code": 500, "ratio": 0.5}));
        let map = value.as_map().unwrap();
        assert_eq!(map["code"], Value::Long(500));
        assert_eq!(map["ratio"], Value::Double(0.5));
    }

    #[test]
    fn date_serializes_as_rfc3339() {
        let date = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            Value::Date(date).to_json(),
            serde_json::json!("2024-01-31T12:00:00.000Z")
        );
    }

    #[test]
    fn period_adds_calendar_months_with_clamping() {
        let date = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let shifted = Period::months(1).add_to(date).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn negative_period_moves_backwards() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let shifted = Period::millis(1000).negated().add_to(date).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    }

    #[test]
    fn period_display() {
        assert_eq!(Period::months(14).to_string(), "P1Y2M");
        assert_eq!(Period::millis(3500).to_string(), "PT3.500S");
        assert_eq!(Period::default().to_string(), "PT0S");
    }

    #[test]
    fn display_string_for_scalars() {
        assert_eq!(Value::from("abc").to_display_string(), "abc");
        assert_eq!(Value::Long(7).to_display_string(), "7");
        assert_eq!(Value::Null.to_display_string(), "");
    }
}
