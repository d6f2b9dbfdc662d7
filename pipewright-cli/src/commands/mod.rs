//! Subcommand handlers

pub mod check;
pub mod config;
pub mod filter;
pub mod functions;
pub mod simulate;

use std::io::Write;
use std::path::Path;

use pipewright_core::message::Message;
use pipewright_rule_engine::Snapshot;
use pipewright_rule_engine::resolver::SourceKind;

use crate::error::CliError;

const MAX_MESSAGE_FILE_SIZE: u64 = 16 * 1024 * 1024; // 16MB

/// Read one message object or an array of message objects from a JSON file.
pub(crate) async fn read_messages(path: &Path) -> Result<Vec<Message>, CliError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_MESSAGE_FILE_SIZE {
        return Err(CliError::Input(format!(
            "{}: file too large: {} bytes (max: {MAX_MESSAGE_FILE_SIZE})",
            path.display(),
            metadata.len()
        )));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_messages(&content).map_err(|e| CliError::Input(format!("{}: {e}", path.display())))
}

fn parse_messages(content: &str) -> Result<Vec<Message>, String> {
    let json: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let items = match json {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| Message::from_json(item).map_err(|e| e.to_string()))
        .collect()
}

/// Parse and resolution problems of a snapshot, one line each.
pub(crate) fn definition_errors(snapshot: &Snapshot) -> Vec<String> {
    let mut errors = Vec::new();
    for source in snapshot.source_errors() {
        for error in source.errors.iter() {
            let kind = match source.kind {
                SourceKind::Rule => "rule",
                SourceKind::Pipeline => "pipeline",
            };
            errors.push(format!("{kind} '{}': {error}", source.id));
        }
    }
    errors.extend(snapshot.resolution_errors().iter().map(ToString::to_string));
    errors
}

pub(crate) fn write_message(w: &mut dyn Write, message: &Message) -> std::io::Result<()> {
    use colored::Colorize;

    writeln!(w, "Message {}", message.id().bold())?;
    let streams: Vec<&str> = message.streams().iter().map(String::as_str).collect();
    writeln!(w, "  streams: {}", streams.join(", "))?;
    for (name, value) in message.fields() {
        writeln!(w, "  {name} = {}", value.to_display_string())?;
    }
    Ok(())
}
