use clap::Parser;

use pipewright_cli::cli::{Cli, Commands};
use pipewright_cli::{effective_config, logging, run};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `config validate` must be able to report a broken file, so its
    // logging falls back to defaults instead of failing early.
    let config = match effective_config(&cli.config).await {
        Ok(config) => config,
        Err(_) if matches!(cli.command, Commands::Config(_)) => Default::default(),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let mut general = config.general.clone();
    if let Some(ref level) = cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }

    // No-op until a global metrics recorder is installed.
    pipewright_core::metrics::describe_all();

    tracing::debug!(config = %cli.config.display(), "pipewright starting");

    if let Err(e) = run(cli, config).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
