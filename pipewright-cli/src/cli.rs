//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Pipewright -- processing pipeline rule interpreter.
///
/// Use `pipewright <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "pipewright", version, about, long_about = None)]
pub struct Cli {
    /// Path to the pipewright.toml configuration file.
    #[arg(short, long, default_value = "pipewright.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse rule and pipeline files and report every error.
    Check(CheckArgs),

    /// Run messages through the pipelines of a definitions directory.
    Simulate(SimulateArgs),

    /// Apply stream destination filters to a message.
    Filter(FilterArgs),

    /// List the function catalog.
    Functions(FunctionsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- check ----

/// Parse `.rule` and `.pipeline` files without loading them.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Files to check.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

// ---- simulate ----

/// Process a message with the definitions found in a directory.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Definitions directory (rules/, pipelines/, connections.toml).
    /// Defaults to `storage.rules_dir` from the configuration.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// JSON file holding one message object or an array of them.
    #[arg(long)]
    pub message: PathBuf,

    /// Include the interpreter trace in the output.
    #[arg(long)]
    pub trace: bool,
}

// ---- filter ----

/// Compute the destinations of a message.
#[derive(Args, Debug)]
pub struct FilterArgs {
    /// TOML file with `[[filter]]` entries.
    /// Defaults to `output_filter.filters_path` from the configuration.
    #[arg(long)]
    pub filters: Option<PathBuf>,

    /// JSON file holding one message object or an array of them.
    #[arg(long)]
    pub message: PathBuf,
}

// ---- functions ----

/// List registered functions and their signatures.
#[derive(Args, Debug)]
pub struct FunctionsArgs {
    /// Only show functions whose name contains this text.
    #[arg(long)]
    pub name: Option<String>,
}

// ---- config ----

/// Manage pipewright configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, interpreter, storage, output_filter).
        #[arg(long)]
        section: Option<String>,
    },
}
