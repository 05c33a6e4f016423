use quest_types::{EventId, ShopItemId, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A catalog entry named in a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CatalogEntryRef {
    Task(TaskId),
    ShopItem(ShopItemId),
}

impl fmt::Display for CatalogEntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "task {id}"),
            Self::ShopItem(id) => write!(f, "shop item {id}"),
        }
    }
}

/// A best-effort secondary effect that did not happen.
///
/// The primary ledger write it accompanies has already succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffectWarning {
    /// A one-time entry could not be removed after use.
    CatalogEntryNotRemoved {
        entry: CatalogEntryRef,
        reason: String,
    },
    /// A reversed purchase debit has no open purchase record to cancel.
    PurchaseNotCancelled { event_id: EventId, reason: String },
}

impl fmt::Display for SideEffectWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CatalogEntryNotRemoved { entry, reason } => {
                write!(f, "one-time {entry} was not removed: {reason}")
            }
            Self::PurchaseNotCancelled { event_id, reason } => {
                write!(f, "purchase for event {event_id} was not cancelled: {reason}")
            }
        }
    }
}

/// Primary result plus the non-fatal warnings collected on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<SideEffectWarning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Record a warning and log it.
    pub(crate) fn warn(&mut self, warning: SideEffectWarning) {
        warn!(warning = %warning, "Secondary effect skipped");
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_accumulate_and_survive_map() {
        let mut outcome = Outcome::new(3);
        assert!(outcome.is_clean());
        outcome.warn(SideEffectWarning::CatalogEntryNotRemoved {
            entry: CatalogEntryRef::Task(TaskId(4)),
            reason: "backend error".into(),
        });
        let mapped = outcome.map(|v| v * 2);
        assert_eq!(mapped.value, 6);
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(
            mapped.warnings[0].to_string(),
            "one-time task 4 was not removed: backend error"
        );
    }
}
