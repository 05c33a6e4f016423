//! CLI error types

use quest_engine::EngineError;
use quest_storage::StorageError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Ledger operation rejected or failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Storage backend could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Command needs an acting user but none was given
    #[error("No acting user: pass --user or set QUEST_USER")]
    MissingUser,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
