//! CLI-specific error types and exit code mapping

use pipewright_core::error::PipewrightError;
use pipewright_rule_engine::RuleEngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Input message could not be read as JSON.
    #[error("invalid message input: {0}")]
    Input(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from pipewright-core.
    #[error("{0}")]
    Core(#[from] PipewrightError),

    /// Rule engine domain error.
    #[error("rule error: {0}")]
    Rule(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command / rule error        |
    /// | 2    | Configuration error                   |
    /// | 3    | Invalid message input                 |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(PipewrightError::Config(_)) => 2,
            Self::Input(_) | Self::Core(PipewrightError::Message(_)) => 3,
            Self::Io(_) | Self::Core(PipewrightError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Rule(_) => 1,
        }
    }
}

impl From<RuleEngineError> for CliError {
    fn from(e: RuleEngineError) -> Self {
        match e {
            config @ RuleEngineError::Config { .. } => Self::Config(config.to_string()),
            RuleEngineError::Io(io) => Self::Io(io),
            other => Self::Rule(other.to_string()),
        }
    }
}
