use crate::catalog::{Award, Task};
use crate::ids::{EventId, GroupId, ShopItemId, TaskId, UserId};
use crate::resolve_snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// What produced a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Task,
    ShopItem,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source type '{0}'")]
pub struct UnknownSourceType(pub String);

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::ShopItem => "shop_item",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = UnknownSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "shop_item" => Ok(Self::ShopItem),
            "manual" => Ok(Self::Manual),
            other => Err(UnknownSourceType(other.to_string())),
        }
    }
}

/// An immutable, balance-affecting record.
///
/// Events are never updated or deleted. Corrections append a new event with
/// the negated amount, see [`LedgerEvent::reversal_append`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    pub actor: UserId,
    pub group_id: GroupId,
    /// Positive earns, negative spends.
    pub amount: i64,
    pub source_type: SourceType,
    /// Catalog entry that produced the event. May point at a deleted row.
    pub source_id: Option<i64>,
    pub quantity: i64,
    /// Title of the source entry at the time of the event.
    pub description: String,
    /// Description of the source entry at the time of the event.
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEvent {
    /// A shop purchase debit, as opposed to the reversal of one.
    pub fn is_purchase_debit(&self) -> bool {
        self.source_type == SourceType::ShopItem && self.amount < 0
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self.source_type {
            SourceType::Task => self.source_id.map(TaskId),
            _ => None,
        }
    }

    pub fn shop_item_id(&self) -> Option<ShopItemId> {
        match self.source_type {
            SourceType::ShopItem => self.source_id.map(ShopItemId),
            _ => None,
        }
    }

    /// The compensating append for this event: everything copied, amount negated.
    ///
    /// `None` when the amount is `i64::MIN`, which has no negation.
    pub fn reversal_append(&self) -> Option<EventAppend> {
        Some(EventAppend {
            actor: self.actor,
            group_id: self.group_id,
            amount: self.amount.checked_neg()?,
            source_type: self.source_type,
            source_id: self.source_id,
            quantity: self.quantity,
            description: self.description.clone(),
            notes: self.notes.clone(),
        })
    }
}

/// Input to `LedgerStore::append_event`. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAppend {
    pub actor: UserId,
    pub group_id: GroupId,
    pub amount: i64,
    pub source_type: SourceType,
    pub source_id: Option<i64>,
    pub quantity: i64,
    pub description: String,
    pub notes: String,
}

impl EventAppend {
    /// Credit for completing `task`, snapshotting its title and description.
    pub fn task_completion(actor: UserId, task: &Task, award: Award) -> Self {
        Self {
            actor,
            group_id: task.group_id,
            amount: award.amount,
            source_type: SourceType::Task,
            source_id: Some(task.id.get()),
            quantity: award.quantity,
            description: task.title.clone(),
            notes: task.description.clone(),
        }
    }

    pub fn manual(
        actor: UserId,
        group_id: GroupId,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            group_id,
            amount,
            source_type: SourceType::Manual,
            source_id: None,
            quantity: 1,
            description: description.into(),
            notes: String::new(),
        }
    }

    /// Materialize the append as a stored event.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> LedgerEvent {
        LedgerEvent {
            id,
            actor: self.actor,
            group_id: self.group_id,
            amount: self.amount,
            source_type: self.source_type,
            source_id: self.source_id,
            quantity: self.quantity,
            description: self.description,
            notes: self.notes,
            created_at,
        }
    }
}

/// Balance as the fold of a (user, group) history. `None` if the sum leaves
/// the `i64` range.
pub fn fold_balance<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Option<i64> {
    events
        .into_iter()
        .try_fold(0i64, |balance, e| balance.checked_add(e.amount))
}

/// A task-sourced event prepared for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletionRecord {
    pub event: LedgerEvent,
    pub title: String,
    pub description: String,
    /// The live task row, when it still exists.
    pub task: Option<Task>,
}

impl TaskCompletionRecord {
    pub const DELETED_TITLE: &'static str = "[Deleted Task]";
    pub const DELETED_DESCRIPTION: &'static str = "This task has been deleted";

    pub fn new(event: LedgerEvent, task: Option<Task>) -> Self {
        let (title, description) = resolve_snapshot(
            &event.description,
            &event.notes,
            task.as_ref()
                .map(|t| (t.title.as_str(), t.description.as_str())),
            (Self::DELETED_TITLE, Self::DELETED_DESCRIPTION),
        );
        Self {
            event,
            title,
            description,
            task,
        }
    }

    pub fn actor(&self) -> UserId {
        self.event.actor
    }
}
