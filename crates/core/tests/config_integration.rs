//! pipewright.toml 통합 설정 테스트
//!
//! - pipewright.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 에러 테스트

use pipewright_core::config::PipewrightConfig;
use pipewright_core::error::{ConfigError, PipewrightError};

// =============================================================================
// pipewright.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../pipewright.toml.example");
    let config = PipewrightConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.interpreter.stage_miss, "stop");
    assert_eq!(config.storage.rules_dir, "/etc/pipewright");
    assert!(!config.output_filter.enabled);
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../pipewright.toml.example");
    let config = PipewrightConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../pipewright.toml.example");
    let from_file = PipewrightConfig::parse(content).expect("should parse");
    let defaults = PipewrightConfig::default();

    assert_eq!(from_file.interpreter.stage_miss, defaults.interpreter.stage_miss);
    assert_eq!(
        from_file.interpreter.strict_resolution,
        defaults.interpreter.strict_resolution
    );
    assert_eq!(
        from_file.storage.init_retry_attempts,
        defaults.storage.init_retry_attempts
    );
    assert_eq!(
        from_file.output_filter.destination_types,
        defaults.output_filter.destination_types
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_interpreter_only() {
    let toml = r#"
[interpreter]
stage_miss = "continue"
"#;
    let config = PipewrightConfig::parse(toml).expect("should parse");
    assert_eq!(config.interpreter.stage_miss, "continue");
    assert_eq!(config.general.log_level, "info");
    config.validate().expect("should validate");
}

#[test]
fn partial_config_output_filter_only() {
    let toml = r#"
[output_filter]
enabled = true
filters_path = "/tmp/filters.toml"
"#;
    let config = PipewrightConfig::parse(toml).expect("should parse");
    assert!(config.output_filter.enabled);
    assert_eq!(config.output_filter.destination_types, vec!["indexer"]);
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "debug"

[something_else]
key = 1
"#;
    let config = PipewrightConfig::parse(toml).expect("unknown sections are ignored");
    assert_eq!(config.general.log_level, "debug");
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[storage]
rules_dir = "/from/toml"
"#;

    let original = std::env::var("PIPEWRIGHT_STORAGE_RULES_DIR").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("PIPEWRIGHT_STORAGE_RULES_DIR", "/from/env");
    }

    let mut config = PipewrightConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.storage.rules_dir.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("PIPEWRIGHT_STORAGE_RULES_DIR", val),
            None => std::env::remove_var("PIPEWRIGHT_STORAGE_RULES_DIR"),
        }
    }

    assert_eq!(result, "/from/env");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("PIPEWRIGHT_STORAGE_INIT_RETRY_INTERVAL_MS", "250");
    }
    let mut config = PipewrightConfig::default();
    config.apply_env_overrides();
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("PIPEWRIGHT_STORAGE_INIT_RETRY_INTERVAL_MS");
    }

    assert_eq!(config.storage.init_retry_interval_ms, 250);
}

// =============================================================================
// 에러 테스트
// =============================================================================

#[test]
fn wrong_type_for_bool_field() {
    let toml = r#"
[interpreter]
strict_resolution = "yes"
"#;
    let err = PipewrightConfig::parse(toml).expect_err("string is not a bool");
    assert!(matches!(
        err,
        PipewrightError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = PipewrightConfig::from_file("/tmp/pipewright_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result.unwrap_err(),
        PipewrightError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn load_rejects_invalid_values_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pipewright.toml");
    std::fs::write(&path, "[interpreter]\nstage_miss = \"sometimes\"\n").expect("write");

    let err = PipewrightConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("interpreter.stage_miss"));
}

#[test]
fn serialize_and_reparse_roundtrip() {
    let mut config = PipewrightConfig::default();
    config.interpreter.stage_miss = "continue".to_owned();
    config.output_filter.destination_types = vec!["indexer".to_owned(), "archive".to_owned()];

    let serialized = toml::to_string(&config).expect("should serialize");
    let reparsed = PipewrightConfig::parse(&serialized).expect("should reparse");
    assert_eq!(reparsed.interpreter.stage_miss, "continue");
    assert_eq!(reparsed.output_filter.destination_types.len(), 2);
}
