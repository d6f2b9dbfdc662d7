//! 설정 관리 -- pipewright.toml 파싱 및 런타임 설정
//!
//! [`PipewrightConfig`]는 인터프리터, 정의 저장소, 출력 필터 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PIPEWRIGHT_INTERPRETER_STAGE_MISS=continue` 형식)
//! 3. 설정 파일 (`pipewright.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), pipewright_core::error::PipewrightError> {
//! use pipewright_core::config::PipewrightConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PipewrightConfig::load("pipewright.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PipewrightConfig::parse("[interpreter]\nstage_miss = \"continue\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PipewrightError};

/// Pipewright 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipewrightConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 인터프리터 동작 설정
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    /// 규칙/파이프라인 정의 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 출력 필터 설정
    #[serde(default)]
    pub output_filter: OutputFilterConfig,
}

impl PipewrightConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PipewrightError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PipewrightError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipewrightError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PipewrightError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PipewrightError> {
        toml::from_str(toml_str).map_err(|e| {
            PipewrightError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PIPEWRIGHT_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PIPEWRIGHT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PIPEWRIGHT_GENERAL_LOG_FORMAT");

        // Interpreter
        override_string(
            &mut self.interpreter.stage_miss,
            "PIPEWRIGHT_INTERPRETER_STAGE_MISS",
        );
        override_bool(
            &mut self.interpreter.strict_resolution,
            "PIPEWRIGHT_INTERPRETER_STRICT_RESOLUTION",
        );
        override_bool(
            &mut self.interpreter.rule_metrics,
            "PIPEWRIGHT_INTERPRETER_RULE_METRICS",
        );
        override_bool(
            &mut self.interpreter.cache_stage_plans,
            "PIPEWRIGHT_INTERPRETER_CACHE_STAGE_PLANS",
        );

        // Storage
        override_string(&mut self.storage.rules_dir, "PIPEWRIGHT_STORAGE_RULES_DIR");
        override_u32(
            &mut self.storage.init_retry_attempts,
            "PIPEWRIGHT_STORAGE_INIT_RETRY_ATTEMPTS",
        );
        override_u64(
            &mut self.storage.init_retry_interval_ms,
            "PIPEWRIGHT_STORAGE_INIT_RETRY_INTERVAL_MS",
        );

        // Output filter
        override_bool(
            &mut self.output_filter.enabled,
            "PIPEWRIGHT_OUTPUT_FILTER_ENABLED",
        );
        override_string(
            &mut self.output_filter.filters_path,
            "PIPEWRIGHT_OUTPUT_FILTER_FILTERS_PATH",
        );
        override_csv(
            &mut self.output_filter.destination_types,
            "PIPEWRIGHT_OUTPUT_FILTER_DESTINATION_TYPES",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipewrightError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // stage_miss 검증
        let valid_stage_miss = ["stop", "continue"];
        if !valid_stage_miss.contains(&self.interpreter.stage_miss.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "interpreter.stage_miss".to_owned(),
                reason: format!("must be one of: {}", valid_stage_miss.join(", ")),
            }
            .into());
        }

        if self.storage.init_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "storage.init_retry_attempts".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }

        if self.output_filter.enabled {
            if self.output_filter.destination_types.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "output_filter.destination_types".to_owned(),
                    reason: "at least one destination type is required".to_owned(),
                }
                .into());
            }
            if self
                .output_filter
                .destination_types
                .iter()
                .any(|t| t.trim().is_empty())
            {
                return Err(ConfigError::InvalidValue {
                    field: "output_filter.destination_types".to_owned(),
                    reason: "destination type must not be empty".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 인터프리터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// 스테이지 불일치 시 동작 (stop: 해당 파이프라인 중단, continue: 다음 스테이지 진행)
    pub stage_miss: String,
    /// 파싱/해석 에러가 하나라도 있으면 리로드 실패로 처리
    pub strict_resolution: bool,
    /// 규칙별 평가/실행 시간 타이머 기록
    pub rule_metrics: bool,
    /// 파이프라인 조합별 스테이지 실행 계획 캐시
    pub cache_stage_plans: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            stage_miss: "stop".to_owned(),
            strict_resolution: false,
            rule_metrics: false,
            cache_stage_plans: true,
        }
    }
}

/// 정의 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `rules/`, `pipelines/`, `connections.toml`을 담은 디렉토리
    pub rules_dir: String,
    /// 최초 스냅샷 구성 재시도 횟수
    pub init_retry_attempts: u32,
    /// 재시도 간격 (밀리초)
    pub init_retry_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rules_dir: "/etc/pipewright".to_owned(),
            init_retry_attempts: 5,
            init_retry_interval_ms: 1_000,
        }
    }
}

/// 출력 필터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFilterConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 스트림 목적지 필터 정의 파일 (TOML)
    pub filters_path: String,
    /// 관리 대상 목적지 유형
    pub destination_types: Vec<String>,
}

impl Default for OutputFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filters_path: "/etc/pipewright/filters.toml".to_owned(),
            destination_types: vec!["indexer".to_owned()],
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split(',').map(|s| s.trim().to_owned()).collect();
    }
}
