//! Per-group single-writer lanes. Idle lanes are pruned on the next acquire.
//!
//! Every ledger-mutating engine call for a group runs while holding that
//! group's lane, so a balance read and the append that depends on it cannot
//! interleave with another writer in the same group.

use quest_types::GroupId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Held for the duration of one write. Dropping it releases the lane.
pub struct LaneGuard {
    _guard: Option<OwnedMutexGuard<()>>,
}

/// Lazily created async mutex per group.
pub struct WriteLanes {
    enabled: bool,
    lanes: Mutex<HashMap<GroupId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteLanes {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive write access to `group_id`.
    ///
    /// Returns an inert guard when serialization is disabled.
    pub async fn acquire(&self, group_id: GroupId) -> LaneGuard {
        if !self.enabled {
            return LaneGuard { _guard: None };
        }
        let lane = {
            let mut lanes = self
                .lanes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Lanes are only cloned under this lock, so a count of one means
            // nobody holds or awaits it.
            lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
            Arc::clone(lanes.entry(group_id).or_default())
        };
        LaneGuard {
            _guard: Some(lane.lock_owned().await),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
