//! 규칙 엔진 에러 타입
//!
//! [`RuleEngineError`]는 정의 로딩, 파싱, 해석, 리로드 과정의 에러를 표현합니다.
//! `From<RuleEngineError> for PipewrightError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use pipewright_core::error::{ConfigError, EngineError, PipewrightError, StorageError};

use crate::parser::ParseErrors;

/// 규칙 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RuleEngineError {
    /// 정의 파일/저장소 로딩 실패
    #[error("load error: {path}: {reason}")]
    Load {
        /// 파일 또는 저장소 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 또는 파이프라인 소스 파싱 실패
    #[error("parse error in '{source_id}': {errors}")]
    Parse {
        /// 규칙/파이프라인 ID
        source_id: String,
        /// 수집된 파싱 에러 목록
        errors: ParseErrors,
    },

    /// 규칙 참조 해석 실패 (strict 모드)
    #[error("resolution error: pipeline '{pipeline}': {reason}")]
    Resolution {
        /// 문제가 된 파이프라인 ID
        pipeline: String,
        /// 실패 사유
        reason: String,
    },

    /// 스냅샷 리로드 실패
    #[error("reload error: {0}")]
    Reload(String),

    /// 아직 게시된 스냅샷이 없음
    #[error("not ready: {0}")]
    NotReady(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RuleEngineError> for PipewrightError {
    fn from(err: RuleEngineError) -> Self {
        match err {
            RuleEngineError::Load { path, reason } => {
                PipewrightError::Storage(StorageError::Read { path, reason })
            }
            RuleEngineError::Parse { .. } => {
                PipewrightError::Engine(EngineError::Parse(err.to_string()))
            }
            RuleEngineError::Resolution { .. } => {
                PipewrightError::Engine(EngineError::Resolution(err.to_string()))
            }
            RuleEngineError::Reload(reason) => PipewrightError::Engine(EngineError::Reload(reason)),
            RuleEngineError::NotReady(reason) => {
                PipewrightError::Engine(EngineError::NotReady(reason))
            }
            RuleEngineError::Config { field, reason } => {
                PipewrightError::Config(ConfigError::InvalidValue { field, reason })
            }
            RuleEngineError::Io(e) => PipewrightError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseError, ParseErrorKind};

    #[test]
    fn load_error_display() {
        let err = RuleEngineError::Load {
            path: "/etc/pipewright/rules/a.rule".to_owned(),
            reason: "file too large".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.rule"));
        assert!(msg.contains("file too large"));
    }

    #[test]
    fn parse_error_display_lists_positions() {
        let err = RuleEngineError::Parse {
            source_id: "r1".to_owned(),
            errors: ParseErrors::new(vec![ParseError::new(
                ParseErrorKind::UndeclaredFunction {
                    name: "nope".to_owned(),
                },
                2,
                4,
            )]),
        };
        let msg = err.to_string();
        assert!(msg.contains("r1"));
        assert!(msg.contains("2:4"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn converts_to_pipewright_error() {
        let err: PipewrightError = RuleEngineError::Reload("storage offline".to_owned()).into();
        assert!(matches!(err, PipewrightError::Engine(EngineError::Reload(_))));

        let err: PipewrightError = RuleEngineError::Config {
            field: "stage_miss".to_owned(),
            reason: "bad".to_owned(),
        }
        .into();
        assert!(matches!(err, PipewrightError::Config(_)));

        let err: PipewrightError = RuleEngineError::Load {
            path: "x".to_owned(),
            reason: "y".to_owned(),
        }
        .into();
        assert!(matches!(err, PipewrightError::Storage(_)));
    }
}
