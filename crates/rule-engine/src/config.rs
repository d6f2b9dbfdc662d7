//! 규칙 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`PipewrightConfig`](pipewright_core::config::PipewrightConfig)에서
//! 엔진이 사용하는 값만 추려 타입이 있는 형태로 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use pipewright_core::config::PipewrightConfig;
//! use pipewright_rule_engine::config::EngineConfig;
//!
//! let core_config = PipewrightConfig::default();
//! let config = EngineConfig::from_core(&core_config)?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pipewright_core::config::PipewrightConfig;
use serde::{Deserialize, Serialize};

use crate::error::RuleEngineError;

/// 스테이지가 매칭되지 않았을 때 파이프라인 진행 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageMissBehavior {
    /// 해당 메시지에 대해 파이프라인 실행 중단 (기본값)
    #[default]
    Stop,
    /// 다음 스테이지로 계속 진행
    Continue,
}

impl FromStr for StageMissBehavior {
    type Err = RuleEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "continue" => Ok(Self::Continue),
            other => Err(RuleEngineError::Config {
                field: "stage_miss".to_owned(),
                reason: format!("unknown behavior '{other}', expected stop or continue"),
            }),
        }
    }
}

impl fmt::Display for StageMissBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// 규칙 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 스테이지 미스 시 동작
    pub stage_miss: StageMissBehavior,
    /// 파싱/해석 에러가 하나라도 있으면 리로드 실패로 처리
    pub strict_resolution: bool,
    /// 규칙별 평가/실행 타이머 기록 여부
    pub rule_metrics: bool,
    /// 파이프라인 조합별 스테이지 실행 계획 캐시 여부
    pub cache_stage_plans: bool,
    /// 첫 스냅샷 로딩 재시도 횟수
    pub init_retry_attempts: u32,
    /// 첫 스냅샷 로딩 재시도 간격
    pub init_retry_interval: Duration,
    /// 출력 필터가 관리하는 목적지 유형
    pub destination_types: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_miss: StageMissBehavior::Stop,
            strict_resolution: false,
            rule_metrics: false,
            cache_stage_plans: true,
            init_retry_attempts: 5,
            init_retry_interval: Duration::from_millis(1000),
            destination_types: vec!["indexer".to_owned()],
        }
    }
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &PipewrightConfig) -> Result<Self, RuleEngineError> {
        let config = Self {
            stage_miss: core.interpreter.stage_miss.parse()?,
            strict_resolution: core.interpreter.strict_resolution,
            rule_metrics: core.interpreter.rule_metrics,
            cache_stage_plans: core.interpreter.cache_stage_plans,
            init_retry_attempts: core.storage.init_retry_attempts,
            init_retry_interval: Duration::from_millis(core.storage.init_retry_interval_ms),
            destination_types: core.output_filter.destination_types.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RuleEngineError> {
        const MAX_RETRY_ATTEMPTS: u32 = 1_000;
        const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(600);

        if self.init_retry_attempts == 0 || self.init_retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(RuleEngineError::Config {
                field: "init_retry_attempts".to_owned(),
                reason: format!("must be 1-{MAX_RETRY_ATTEMPTS}"),
            });
        }

        if self.init_retry_interval > MAX_RETRY_INTERVAL {
            return Err(RuleEngineError::Config {
                field: "init_retry_interval".to_owned(),
                reason: format!("must not exceed {}s", MAX_RETRY_INTERVAL.as_secs()),
            });
        }

        if self.destination_types.iter().any(|t| t.trim().is_empty()) {
            return Err(RuleEngineError::Config {
                field: "destination_types".to_owned(),
                reason: "destination type must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 엔진 설정 빌더
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_miss(mut self, behavior: StageMissBehavior) -> Self {
        self.config.stage_miss = behavior;
        self
    }

    pub fn strict_resolution(mut self, strict: bool) -> Self {
        self.config.strict_resolution = strict;
        self
    }

    pub fn rule_metrics(mut self, enabled: bool) -> Self {
        self.config.rule_metrics = enabled;
        self
    }

    pub fn cache_stage_plans(mut self, enabled: bool) -> Self {
        self.config.cache_stage_plans = enabled;
        self
    }

    /// 첫 스냅샷 로딩 재시도 정책을 설정합니다.
    pub fn init_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.init_retry_attempts = attempts;
        self.config.init_retry_interval = interval;
        self
    }

    pub fn destination_types(mut self, types: Vec<String>) -> Self {
        self.config.destination_types = types;
        self
    }

    /// 설정을 검증하고 `EngineConfig`를 생성합니다.
    pub fn build(self) -> Result<EngineConfig, RuleEngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_maps_interpreter_section() {
        let mut core = PipewrightConfig::default();
        core.interpreter.stage_miss = "continue".to_owned();
        core.interpreter.strict_resolution = true;
        core.storage.init_retry_interval_ms = 250;

        let config = EngineConfig::from_core(&core).unwrap();
        assert_eq!(config.stage_miss, StageMissBehavior::Continue);
        assert!(config.strict_resolution);
        assert_eq!(config.init_retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn from_core_rejects_unknown_stage_miss() {
        let mut core = PipewrightConfig::default();
        core.interpreter.stage_miss = "skip".to_owned();
        assert!(EngineConfig::from_core(&core).is_err());
    }

    #[test]
    fn stage_miss_parsing_is_case_insensitive() {
        assert_eq!("STOP".parse::<StageMissBehavior>().unwrap(), StageMissBehavior::Stop);
        assert_eq!(StageMissBehavior::Continue.to_string(), "continue");
    }

    #[test]
    fn builder_validates() {
        let result = EngineConfigBuilder::new()
            .init_retry(0, Duration::from_millis(10))
            .build();
        assert!(result.is_err());

        let config = EngineConfigBuilder::new()
            .stage_miss(StageMissBehavior::Continue)
            .rule_metrics(true)
            .init_retry(3, Duration::from_millis(10))
            .build()
            .unwrap();
        assert!(config.rule_metrics);
        assert_eq!(config.init_retry_attempts, 3);
    }

    #[test]
    fn builder_rejects_blank_destination_type() {
        let result = EngineConfigBuilder::new()
            .destination_types(vec!["indexer".to_owned(), " ".to_owned()])
            .build();
        assert!(result.is_err());
    }
}
