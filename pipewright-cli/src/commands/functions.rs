//! `pipewright functions` command handler

use std::io::Write;

use serde::Serialize;

use pipewright_rule_engine::FunctionDescriptor;
use pipewright_rule_engine::filter::filter_function_registry;

use crate::cli::FunctionsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `functions` command.
///
/// Lists the filter registry, which is the built-in catalog plus
/// `remove_from_stream_destination`.
pub fn execute(args: FunctionsArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let report = catalog(args.name.as_deref());
    writer.render(&report)
}

pub fn catalog(name_filter: Option<&str>) -> FunctionCatalog {
    let registry = filter_function_registry();
    let functions = registry
        .descriptors()
        .into_iter()
        .filter(|d| name_filter.is_none_or(|needle| d.name().contains(needle)))
        .map(FunctionEntry::from)
        .collect();
    FunctionCatalog { functions }
}

#[derive(Debug, Serialize)]
pub struct FunctionEntry {
    pub signature: String,
    #[serde(flatten)]
    pub descriptor: FunctionDescriptor,
}

impl From<&FunctionDescriptor> for FunctionEntry {
    fn from(descriptor: &FunctionDescriptor) -> Self {
        Self {
            signature: descriptor.signature(),
            descriptor: descriptor.clone(),
        }
    }
}

/// Function catalog sorted by name.
#[derive(Debug, Serialize)]
pub struct FunctionCatalog {
    pub functions: Vec<FunctionEntry>,
}

impl Render for FunctionCatalog {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for entry in &self.functions {
            writeln!(w, "{}", entry.signature.bold())?;
            if let Some(description) = entry.descriptor.get_description() {
                writeln!(w, "    {description}")?;
            }
        }
        writeln!(w)?;
        writeln!(w, "{} function(s)", self.functions.len())?;
        Ok(())
    }
}
