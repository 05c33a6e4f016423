//! questctl configuration: defaults, then an optional file, then `QUEST__*`
//! environment variables.

use crate::error::CliResult;
use quest_engine::EngineConfig;
use quest_storage::StorageConfig;
use serde::{Deserialize, Serialize};

/// Complete CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            storage: default_storage(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig::sqlite("sqlite://quest.db")
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl QuestConfig {
    /// Load configuration, layering an optional file and the environment
    /// over the defaults.
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&QuestConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double underscore so keys like `max_connections` survive.
        builder = builder.add_source(
            config::Environment::with_prefix("QUEST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_local_sqlite_file() {
        let config = QuestConfig::default();
        assert_eq!(config.storage, StorageConfig::sqlite("sqlite://quest.db"));
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
restore_window_secs = 60

[storage]
type = "memory"

[logging]
json = true
"#
        )
        .unwrap();

        let config = QuestConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.engine.restore_window_secs, 60);
        assert_eq!(config.engine.default_quantity, 10);
        assert!(config.logging.json);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = QuestConfig::load(Some("/nonexistent/questctl")).unwrap();
        assert_eq!(config, QuestConfig::default());
    }
}
