//! `pipewright filter` command handler

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use pipewright_core::config::PipewrightConfig;
use pipewright_core::message::Message;
use pipewright_rule_engine::filter::{
    FilterDefinitionSource, InMemoryFilterSource, TomlFilterSource, filter_function_registry,
};
use pipewright_rule_engine::{
    EngineConfig, InMemoryMetricRegistry, PipelineResolver, PipelineRuleOutputFilter,
    RuleEngineError, RuleParser, StreamDestinationFilter,
};

use crate::cli::FilterArgs;
use crate::commands::{definition_errors, read_messages, write_message};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `filter` command.
pub async fn execute(
    args: FilterArgs,
    config: &PipewrightConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let path = args
        .filters
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output_filter.filters_path));
    let filters = read_filters(&path).await?;
    let messages = read_messages(&args.message).await?;
    let report = apply_filters(&path.display().to_string(), filters, messages, config)?;
    writer.render(&report)
}

async fn read_filters(path: &Path) -> Result<Vec<StreamDestinationFilter>, CliError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RuleEngineError::Load {
            path: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })?;
    let mut filters = TomlFilterSource::parse(&content, &path.display().to_string())?;
    filters.retain(StreamDestinationFilter::is_enabled);
    Ok(filters)
}

/// Compute destinations for every message with the given enabled filters.
pub fn apply_filters(
    source: &str,
    filters: Vec<StreamDestinationFilter>,
    messages: Vec<Message>,
    config: &PipewrightConfig,
) -> Result<FilterReport, CliError> {
    let engine_config = EngineConfig::from_core(config)?;
    info!(filters = filters.len(), messages = messages.len(), "applying output filters");

    let definitions = FilterDefinitionSource::<InMemoryFilterSource>::definitions(&filters);
    let resolver = PipelineResolver::new(
        RuleParser::new(Arc::new(filter_function_registry())),
        Arc::new(InMemoryMetricRegistry::new()),
        &engine_config,
    );
    let snapshot = Arc::new(resolver.resolve(&definitions, 1)?);
    let definition_errors = definition_errors(&snapshot);
    if !definition_errors.is_empty() {
        warn!(errors = definition_errors.len(), "some filters could not be parsed, skipping them");
    }

    let output = PipelineRuleOutputFilter::new(snapshot, &engine_config);
    let results = messages
        .into_iter()
        .map(|message| {
            let filtered = output.apply(message);
            FilterResult {
                message: filtered.message,
                destinations: filtered.destinations,
            }
        })
        .collect();

    Ok(FilterReport {
        source: source.to_owned(),
        filters: filters.len(),
        definition_errors,
        results,
    })
}

#[derive(Debug, Serialize)]
pub struct FilterResult {
    pub message: Message,
    /// Destination type to stream IDs
    pub destinations: BTreeMap<String, BTreeSet<String>>,
}

/// Output filter result.
#[derive(Debug, Serialize)]
pub struct FilterReport {
    /// Filter definitions file
    pub source: String,
    /// Number of enabled filters
    pub filters: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definition_errors: Vec<String>,
    pub results: Vec<FilterResult>,
}

impl Render for FilterReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Filters: {} ({} enabled)",
            self.source.bold(),
            self.filters
        )?;
        for error in &self.definition_errors {
            writeln!(w, "  {}", error.yellow())?;
        }

        for result in &self.results {
            writeln!(w)?;
            write_message(w, &result.message)?;
            writeln!(w, "  destinations:")?;
            for (destination, streams) in &result.destinations {
                let streams: Vec<&str> = streams.iter().map(String::as_str).collect();
                if streams.is_empty() {
                    writeln!(w, "    {destination}: {}", "(none)".dimmed())?;
                } else {
                    writeln!(w, "    {destination}: {}", streams.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
