//! `pipewright check` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use pipewright_rule_engine::{FunctionRegistry, ParseError, RuleParser};

use crate::cli::CheckArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const MAX_SOURCE_FILE_SIZE: u64 = 1024 * 1024; // 1MB

/// Execute the `check` command.
///
/// Every file is checked even when an earlier one fails. The report is
/// rendered first, then `CliError::Rule` is returned if any file had errors.
pub async fn execute(args: CheckArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let parser = RuleParser::new(Arc::new(FunctionRegistry::with_builtins()));
    info!(files = args.files.len(), "checking definition files");

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(check_file(&parser, path).await);
    }
    let report = CheckReport::new(files);

    writer.render(&report)?;

    if report.error_count > 0 {
        return Err(CliError::Rule(format!(
            "{} error(s) in {} file(s)",
            report.error_count, report.failed_files
        )));
    }
    Ok(())
}

/// Check one file. Read failures are reported, not propagated.
pub async fn check_file(parser: &RuleParser, path: &Path) -> FileCheck {
    let display = path.display().to_string();
    let kind = match path.extension().and_then(|e| e.to_str()) {
        Some("rule") => SourceKind::Rule,
        Some("pipeline") => SourceKind::Pipeline,
        _ => {
            return FileCheck::failed(
                display,
                None,
                "unsupported file extension (expected .rule or .pipeline)".to_owned(),
            );
        }
    };

    let content = match read_source(path).await {
        Ok(content) => content,
        Err(reason) => return FileCheck::failed(display, Some(kind), reason),
    };

    debug!(path = %path.display(), bytes = content.len(), "parsing definition file");
    let result = match kind {
        SourceKind::Rule => parser.parse_rule(&content).map(|rule| vec![rule.name]),
        SourceKind::Pipeline => parser
            .parse_pipelines(&content)
            .map(|pipelines| pipelines.into_iter().map(|p| p.name).collect()),
    };

    match result {
        Ok(names) => FileCheck {
            path: display,
            kind: Some(kind),
            names,
            errors: Vec::new(),
            failure: None,
        },
        Err(errors) => FileCheck {
            path: display,
            kind: Some(kind),
            names: Vec::new(),
            errors: errors.into_vec(),
            failure: None,
        },
    }
}

async fn read_source(path: &Path) -> Result<String, String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("failed to read file metadata: {e}"))?;
    if metadata.len() > MAX_SOURCE_FILE_SIZE {
        return Err(format!(
            "file too large: {} bytes (max: {MAX_SOURCE_FILE_SIZE})",
            metadata.len()
        ));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read file: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rule,
    Pipeline,
}

/// Result for a single file.
#[derive(Debug, Serialize)]
pub struct FileCheck {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceKind>,
    /// Names of the rule or pipelines declared in the file
    pub names: Vec<String>,
    pub errors: Vec<ParseError>,
    /// The file could not be read or has an unknown extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl FileCheck {
    fn failed(path: String, kind: Option<SourceKind>, reason: String) -> Self {
        Self {
            path,
            kind,
            names: Vec::new(),
            errors: Vec::new(),
            failure: Some(reason),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len() + usize::from(self.failure.is_some())
    }
}

/// Check report for all files.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub files: Vec<FileCheck>,
    pub error_count: usize,
    pub failed_files: usize,
}

impl CheckReport {
    pub fn new(files: Vec<FileCheck>) -> Self {
        let error_count = files.iter().map(FileCheck::error_count).sum();
        let failed_files = files.iter().filter(|f| f.error_count() > 0).count();
        Self {
            files,
            error_count,
            failed_files,
        }
    }
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for file in &self.files {
            if let Some(ref failure) = file.failure {
                writeln!(w, "{}: {} {}", file.path, "ERROR".red().bold(), failure)?;
            } else if file.errors.is_empty() {
                writeln!(
                    w,
                    "{}: {} ({})",
                    file.path,
                    "OK".green().bold(),
                    file.names.join(", ")
                )?;
            } else {
                writeln!(
                    w,
                    "{}: {} {} error(s)",
                    file.path,
                    "FAILED".red().bold(),
                    file.errors.len()
                )?;
                for error in &file.errors {
                    writeln!(w, "  {error}")?;
                }
            }
        }

        writeln!(w)?;
        writeln!(
            w,
            "Checked {} file(s): {} error(s)",
            self.files.len(),
            self.error_count
        )?;
        Ok(())
    }
}
