use serde::{Deserialize, Serialize};

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// SQLite storage
    Sqlite {
        /// Connection URL, e.g. `sqlite://quest.db` or `sqlite::memory:`
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    pub fn sqlite(url: impl Into<String>) -> Self {
        Self::Sqlite {
            url: url.into(),
            max_connections: default_pool_size(),
            connect_timeout_secs: default_connection_timeout(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite { .. } => "sqlite",
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}
