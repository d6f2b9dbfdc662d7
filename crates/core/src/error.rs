//! 에러 타입 -- 도메인별 에러 정의

/// Pipewright 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PipewrightError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 규칙 엔진 에러
    #[error("rule engine error: {0}")]
    Engine(#[from] EngineError),

    /// 정의 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 메시지 변환 에러
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 규칙 엔진 에러 (상위 레이어 전파용 요약)
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 규칙/파이프라인 소스 파싱 실패
    #[error("parse failed: {0}")]
    Parse(String),

    /// 규칙 참조 해석 실패
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// 스냅샷 재구성 실패
    #[error("reload failed: {0}")]
    Reload(String),

    /// 초기 스냅샷 없음
    #[error("engine not ready: {0}")]
    NotReady(String),
}

/// 정의 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소 읽기 실패
    #[error("read failed: {path}: {reason}")]
    Read { path: String, reason: String },

    /// 저장된 정의가 형식에 맞지 않음
    #[error("invalid definition: {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// 메시지 입출력 변환 에러
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// JSON 표현이 메시지 형식이 아님
    #[error("invalid message json: {0}")]
    InvalidJson(String),
}
