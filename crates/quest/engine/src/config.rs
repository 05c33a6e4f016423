use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Integer-task quantity hint used when a draft omits one or gives a
    /// non-positive value.
    #[serde(default = "default_quantity")]
    pub default_quantity: i64,

    /// How long a deleted catalog entry stays restorable, in seconds.
    #[serde(default = "default_restore_window_secs")]
    pub restore_window_secs: u64,

    /// Restorable entries kept per entry kind; the oldest is dropped first.
    #[serde(default = "default_restore_capacity")]
    pub restore_capacity: usize,

    /// Route ledger-mutating calls for a group through one writer at a time.
    #[serde(default = "default_serialize_group_writes")]
    pub serialize_group_writes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_quantity: default_quantity(),
            restore_window_secs: default_restore_window_secs(),
            restore_capacity: default_restore_capacity(),
            serialize_group_writes: default_serialize_group_writes(),
        }
    }
}

impl EngineConfig {
    pub fn restore_window(&self) -> Duration {
        Duration::from_secs(self.restore_window_secs)
    }
}

fn default_quantity() -> i64 {
    10
}

fn default_restore_window_secs() -> u64 {
    30 * 60
}

fn default_restore_capacity() -> usize {
    256
}

fn default_serialize_group_writes() -> bool {
    true
}
