//! Integration tests for the `pipewright` commands.
//!
//! Commands are driven through the library entry points with real files.

use std::fs;
use std::path::Path;

use clap::Parser;
use tempfile::TempDir;

use pipewright_cli::cli::Cli;
use pipewright_cli::commands;
use pipewright_cli::{effective_config, run};

fn write_definitions(root: &Path) {
    fs::create_dir_all(root.join("rules")).expect("should create rules dir");
    fs::create_dir_all(root.join("pipelines")).expect("should create pipelines dir");
    fs::write(
        root.join("rules/route.rule"),
        r#"rule "route"
when to_string($message.level) == "error"
then
    route_to_stream(id: "errors");
    set_field("routed", true);
end"#,
    )
    .expect("should write rule");
    fs::write(
        root.join("rules/mark.rule"),
        r#"rule "mark" when true then set_field("seen_by_errors", true); end"#,
    )
    .expect("should write rule");
    fs::write(
        root.join("pipelines/main.pipeline"),
        r#"pipeline "main" stage 0 match either rule "route"; end"#,
    )
    .expect("should write pipeline");
    fs::write(
        root.join("pipelines/errors.pipeline"),
        r#"pipeline "errors" stage 0 match all rule "mark"; end"#,
    )
    .expect("should write pipeline");
    fs::write(
        root.join("connections.toml"),
        r#"
[[connection]]
stream = "000000000000000000000001"
pipelines = ["main"]

[[connection]]
stream = "errors"
pipelines = ["errors"]
"#,
    )
    .expect("should write connections");
}

#[tokio::test]
async fn test_effective_config_defaults_when_file_missing() {
    let config = effective_config(Path::new("/nonexistent/pipewright.toml"))
        .await
        .expect("missing file falls back to defaults");
    assert_eq!(config.interpreter.stage_miss, "stop");
}

#[tokio::test]
async fn test_effective_config_reads_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("pipewright.toml");
    fs::write(
        &config_path,
        "[interpreter]\nstage_miss = \"continue\"\ncache_stage_plans = false\n",
    )
    .expect("should write config");

    let config = effective_config(&config_path).await.expect("config should load");
    assert_eq!(config.interpreter.stage_miss, "continue");
    assert!(!config.interpreter.cache_stage_plans);
}

#[tokio::test]
async fn test_config_validate_valid_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("pipewright.toml");
    fs::write(
        &config_path,
        r#"
[general]
log_level = "info"
log_format = "json"

[interpreter]
stage_miss = "stop"

[output_filter]
enabled = true
destination_types = ["indexer", "archive"]
"#,
    )
    .expect("should write config");

    let report = commands::config::validate(&config_path).await;
    assert!(report.valid, "{:?}", report.errors);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[general\nlog_level = \"info\"\n").expect("should write bad config");

    let report = commands::config::validate(&config_path).await;
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_config_validate_invalid_stage_miss() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("pipewright.toml");
    fs::write(&config_path, "[interpreter]\nstage_miss = \"sometimes\"\n")
        .expect("should write config");

    let report = commands::config::validate(&config_path).await;
    assert!(!report.valid);
    assert!(report.errors[0].contains("stage_miss"), "{:?}", report.errors);
}

#[tokio::test]
async fn test_config_validate_missing_file() {
    let report = commands::config::validate(Path::new("/nonexistent/pipewright.toml")).await;
    assert!(!report.valid, "missing file should be invalid");
}

#[tokio::test]
async fn test_config_show_section() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("pipewright.toml");
    fs::write(&config_path, "[storage]\nrules_dir = \"/srv/rules\"\n").expect("should write config");

    let report = commands::config::show(&config_path, Some("storage".to_owned()))
        .await
        .expect("show should succeed");
    assert!(report.config_toml.contains("/srv/rules"), "{}", report.config_toml);
    assert!(!report.config_toml.contains("stage_miss"));
}

#[tokio::test]
async fn test_config_show_unknown_section() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("pipewright.toml");
    fs::write(&config_path, "").expect("should write config");

    let err = commands::config::show(&config_path, Some("ebpf".to_owned()))
        .await
        .err()
        .expect("unknown section should fail");
    assert!(err.to_string().contains("unknown section"));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_simulate_follows_routed_stream() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_definitions(temp_dir.path());

    let mut message = pipewright_core::message::Message::empty();
    message.add_field("level", pipewright_core::value::Value::from("error"));

    let report = commands::simulate::simulate(
        temp_dir.path(),
        vec![message],
        false,
        &pipewright_core::config::PipewrightConfig::default(),
    )
    .await
    .expect("simulation should succeed");

    assert_eq!(report.messages.len(), 1);
    let out = &report.messages[0];
    assert!(out.has_field("routed"));
    assert!(out.has_field("seen_by_errors"), "errors pipeline should run after routing");
    assert!(out.streams().contains("errors"));
}

#[tokio::test]
async fn test_run_simulate_from_message_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_definitions(temp_dir.path());
    let message_path = temp_dir.path().join("message.json");
    fs::write(&message_path, r#"[{"level": "error"}, {"level": "info"}]"#)
        .expect("should write message");

    let dir = temp_dir.path().display().to_string();
    let message = message_path.display().to_string();
    let cli = Cli::try_parse_from([
        "pipewright",
        "--output",
        "json",
        "simulate",
        "--dir",
        dir.as_str(),
        "--message",
        message.as_str(),
    ])
    .expect("parse succeeded");

    let config = effective_config(&cli.config).await.expect("defaults");
    run(cli, config).await.expect("simulate should succeed");
}

#[tokio::test]
async fn test_run_simulate_rejects_invalid_message_json() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_definitions(temp_dir.path());
    let message_path = temp_dir.path().join("message.json");
    fs::write(&message_path, "\"just a string\"").expect("should write message");

    let dir = temp_dir.path().display().to_string();
    let message = message_path.display().to_string();
    let cli = Cli::try_parse_from([
        "pipewright",
        "simulate",
        "--dir",
        dir.as_str(),
        "--message",
        message.as_str(),
    ])
    .expect("parse succeeded");

    let config = effective_config(&cli.config).await.expect("defaults");
    let err = run(cli, config).await.expect_err("a string is not a message");
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_run_check_fails_on_parse_errors() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let good = temp_dir.path().join("good.rule");
    let bad = temp_dir.path().join("bad.rule");
    fs::write(&good, r#"rule "good" when true then end"#).expect("should write rule");
    fs::write(&bad, r#"rule "bad" when true then unknown(); end"#).expect("should write rule");

    let good = good.display().to_string();
    let bad = bad.display().to_string();
    let cli = Cli::try_parse_from(["pipewright", "check", good.as_str(), bad.as_str()])
        .expect("parse succeeded");

    let config = effective_config(&cli.config).await.expect("defaults");
    let err = run(cli, config).await.expect_err("bad.rule has an error");
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("1 error(s) in 1 file(s)"), "{err}");
}

#[tokio::test]
async fn test_run_filter_with_toml_filters() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let filters_path = temp_dir.path().join("filters.toml");
    fs::write(
        &filters_path,
        r#"
[[filter]]
id = "debug"
stream_id = "app"
destination_type = "indexer"
condition = 'to_string($message.level) == "debug"'
"#,
    )
    .expect("should write filters");
    let message_path = temp_dir.path().join("message.json");
    fs::write(
        &message_path,
        r#"{"fields": {"level": "debug"}, "streams": ["app", "audit"]}"#,
    )
    .expect("should write message");

    let filters = filters_path.display().to_string();
    let message = message_path.display().to_string();
    let cli = Cli::try_parse_from([
        "pipewright",
        "filter",
        "--filters",
        filters.as_str(),
        "--message",
        message.as_str(),
    ])
    .expect("parse succeeded");

    let config = effective_config(&cli.config).await.expect("defaults");
    run(cli, config).await.expect("filter should succeed");
}
