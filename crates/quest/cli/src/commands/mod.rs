//! CLI command implementations

pub mod group;
pub mod ledger;
pub mod purchase;
pub mod shop;
pub mod task;

use crate::config::QuestConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use chrono::{DateTime, Utc};
use quest_engine::QuestEngine;
use quest_types::UserId;

/// Everything a command needs to run.
pub struct Session {
    pub engine: QuestEngine,
    pub user: Option<UserId>,
    pub format: OutputFormat,
}

impl Session {
    /// Open the configured backend and build the engine over it.
    pub async fn open(
        config: &QuestConfig,
        user: Option<UserId>,
        format: OutputFormat,
    ) -> CliResult<Self> {
        tracing::debug!(backend = config.storage.backend_name(), "Opening storage");
        let storage = quest_storage::connect(&config.storage).await?;
        Ok(Self {
            engine: QuestEngine::new(storage, config.engine.clone()),
            user,
            format,
        })
    }

    /// The acting user; every ledger command needs one.
    pub fn actor(&self) -> CliResult<UserId> {
        self.user.ok_or(CliError::MissingUser)
    }
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn optional_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(timestamp).unwrap_or_else(|| "-".to_string())
}
