//! `pipewright simulate` command handler

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use pipewright_core::config::PipewrightConfig;
use pipewright_core::message::Message;
use pipewright_rule_engine::{
    DirectoryDefinitionSource, EngineConfig, FunctionRegistry, InMemoryMetricRegistry, Interpreter,
    NoopInterpreterListener, PipelineResolver, RuleParser, Snapshot, TraceListener,
};

use crate::cli::SimulateArgs;
use crate::commands::{definition_errors, read_messages, write_message};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `simulate` command.
pub async fn execute(
    args: SimulateArgs,
    config: &PipewrightConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.rules_dir));
    let messages = read_messages(&args.message).await?;
    let report = simulate(&dir, messages, args.trace, config).await?;
    writer.render(&report)
}

/// Load the definitions under `dir` and run `messages` through them.
pub async fn simulate(
    dir: &Path,
    messages: Vec<Message>,
    trace: bool,
    config: &PipewrightConfig,
) -> Result<SimulateReport, CliError> {
    let engine_config = EngineConfig::from_core(config)?;
    info!(dir = %dir.display(), messages = messages.len(), "simulating pipelines");

    let snapshot = Arc::new(load_snapshot(dir, &engine_config).await?);
    let definition_errors = definition_errors(&snapshot);
    if !definition_errors.is_empty() {
        warn!(
            errors = definition_errors.len(),
            "definitions have errors, affected rules and pipelines are skipped"
        );
    }

    let interpreter = Interpreter::with_config(Arc::clone(&snapshot), &engine_config);
    let (messages, trace) = if trace {
        let mut listener = TraceListener::new();
        let output = interpreter.process(messages, &mut listener);
        (output, listener.into_lines())
    } else {
        (
            interpreter.process(messages, &mut NoopInterpreterListener),
            Vec::new(),
        )
    };

    Ok(SimulateReport {
        source: dir.display().to_string(),
        rules: snapshot.rules().len(),
        pipelines: snapshot.pipelines().len(),
        definition_errors,
        messages,
        trace,
    })
}

async fn load_snapshot(dir: &Path, config: &EngineConfig) -> Result<Snapshot, CliError> {
    let definitions = DirectoryDefinitionSource::new(dir.to_path_buf())
        .load_directory()
        .await?;
    let resolver = PipelineResolver::new(
        RuleParser::new(Arc::new(FunctionRegistry::with_builtins())),
        Arc::new(InMemoryMetricRegistry::new()),
        config,
    );
    Ok(resolver.resolve(&definitions, 1)?)
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateReport {
    /// Definitions directory
    pub source: String,
    pub rules: usize,
    pub pipelines: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definition_errors: Vec<String>,
    /// Surviving input messages and messages created by rules
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl Render for SimulateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Definitions: {} ({} rules, {} pipelines)",
            self.source.bold(),
            self.rules,
            self.pipelines
        )?;
        for error in &self.definition_errors {
            writeln!(w, "  {}", error.yellow())?;
        }

        if !self.trace.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Trace:".bold())?;
            for line in &self.trace {
                writeln!(w, "  {line}")?;
            }
        }

        writeln!(w)?;
        if self.messages.is_empty() {
            writeln!(w, "{}", "All messages were dropped".yellow())?;
        }
        for message in &self.messages {
            write_message(w, message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::value::Value;

    fn write_definitions(root: &Path) {
        std::fs::create_dir_all(root.join("rules")).expect("rules dir");
        std::fs::create_dir_all(root.join("pipelines")).expect("pipelines dir");
        std::fs::write(
            root.join("rules/categorize.rule"),
            r#"rule "categorize" when to_long($message.responseCode) >= 500
               then set_field("response_category", "server_error"); end"#,
        )
        .expect("write rule");
        std::fs::write(
            root.join("pipelines/main.pipeline"),
            r#"pipeline "main" stage 0 match either rule "categorize"; end"#,
        )
        .expect("write pipeline");
        std::fs::write(
            root.join("connections.toml"),
            "[[connection]]\nstream = \"000000000000000000000001\"\npipelines = [\"main\"]\n",
        )
        .expect("write connections");
    }

    fn message(code: i64) -> Message {
        let mut message = Message::empty();
        message.add_field("responseCode", Value::Long(code));
        message
    }

    #[tokio::test]
    async fn test_simulate_applies_rules() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_definitions(dir.path());

        let report = simulate(dir.path(), vec![message(503)], false, &PipewrightConfig::default())
            .await
            .expect("simulation should succeed");
        assert_eq!(report.rules, 1);
        assert_eq!(report.pipelines, 1);
        assert_eq!(
            report.messages[0].field("response_category"),
            Some(&Value::from("server_error"))
        );
        assert!(report.trace.is_empty());
    }

    #[tokio::test]
    async fn test_simulate_with_trace_records_rule_evaluation() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_definitions(dir.path());

        let report = simulate(dir.path(), vec![message(200)], true, &PipewrightConfig::default())
            .await
            .expect("simulation should succeed");
        assert!(!report.messages[0].has_field("response_category"));
        assert!(
            report.trace.iter().any(|l| l.contains("categorize")),
            "{:?}",
            report.trace
        );
    }

    #[tokio::test]
    async fn test_simulate_reports_definition_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_definitions(dir.path());
        std::fs::write(dir.path().join("rules/broken.rule"), "rule \"broken\" when")
            .expect("write broken rule");

        let report = simulate(dir.path(), vec![message(503)], false, &PipewrightConfig::default())
            .await
            .expect("lenient resolution keeps working rules");
        assert_eq!(report.definition_errors.len(), 1);
        assert!(report.definition_errors[0].starts_with("rule 'broken'"));
        assert!(report.messages[0].has_field("response_category"));
    }

    #[tokio::test]
    async fn test_simulate_strict_resolution_fails_on_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_definitions(dir.path());
        std::fs::write(dir.path().join("rules/broken.rule"), "rule \"broken\" when")
            .expect("write broken rule");

        let mut config = PipewrightConfig::default();
        config.interpreter.strict_resolution = true;
        let err = simulate(dir.path(), vec![message(503)], false, &config)
            .await
            .expect_err("strict resolution rejects broken definitions");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_report_json_omits_empty_trace() {
        let report = SimulateReport {
            source: "defs".to_owned(),
            rules: 0,
            pipelines: 0,
            definition_errors: Vec::new(),
            messages: vec![Message::empty()],
            trace: Vec::new(),
        };
        let json = serde_json::to_value(&report).expect("JSON serialization should succeed");
        assert!(json.get("trace").is_none());
        assert!(json.get("definition_errors").is_none());
        assert_eq!(json["messages"].as_array().map(Vec::len), Some(1));
    }
}
