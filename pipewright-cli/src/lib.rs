//! Pipewright command-line interface
//!
//! The binary in `main.rs` only parses arguments and maps errors to exit codes.
//! Command handlers live here so integration tests can drive them directly.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

use std::path::Path;

use pipewright_core::config::PipewrightConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Load the configuration the commands run with.
///
/// A missing file is not an error: defaults plus `PIPEWRIGHT_*` overrides are used.
pub async fn effective_config(path: &Path) -> Result<PipewrightConfig, CliError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(PipewrightConfig::load(path).await?);
    }
    tracing::debug!(path = %path.display(), "configuration file not found, using defaults");
    let mut config = PipewrightConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli, config: PipewrightConfig) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Check(args) => commands::check::execute(args, &writer).await,
        Commands::Simulate(args) => commands::simulate::execute(args, &config, &writer).await,
        Commands::Filter(args) => commands::filter::execute(args, &config, &writer).await,
        Commands::Functions(args) => commands::functions::execute(args, &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
