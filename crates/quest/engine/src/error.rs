use quest_storage::StorageError;
use quest_types::{AwardError, UnknownPolicyKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to presentation layers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: i64, need: i64 },

    #[error("storage failure while trying to {context}: {source}")]
    StorageFailure {
        context: String,
        #[source]
        source: StorageError,
    },
}

/// Taxonomy kind of an [`EngineError`], stable for display and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Forbidden,
    InsufficientFunds,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::InsufficientFunds => "insufficient_funds",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::StorageFailure { .. } => ErrorKind::StorageFailure,
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Wrap a storage error with the operation it interrupted.
    ///
    /// Storage outcomes that belong to the taxonomy (missing rows, rejected
    /// input, balance shortfall) are translated rather than wrapped.
    pub fn storage(context: impl Into<String>, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            StorageError::InvalidInput(what) => Self::InvalidArgument(what),
            StorageError::InsufficientBalance { have, need } => {
                Self::InsufficientFunds { have, need }
            }
            other => Self::StorageFailure {
                context: context.into(),
                source: other,
            },
        }
    }
}

impl From<AwardError> for EngineError {
    fn from(err: AwardError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<UnknownPolicyKind> for EngineError {
    fn from(err: UnknownPolicyKind) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Attach operation context to storage results.
pub(crate) trait StorageContext<T> {
    fn context(self, context: &str) -> EngineResult<T>;
}

impl<T> StorageContext<T> for Result<T, StorageError> {
    fn context(self, context: &str) -> EngineResult<T> {
        self.map_err(|err| EngineError::storage(context, err))
    }
}
