//! Quest Ledger domain model.
//!
//! Pure data shared by storage adapters, the engines and presentation layers:
//! - catalog entries (tasks earn currency, shop items spend it)
//! - immutable ledger events, whose fold per (user, group) is the balance
//! - purchase records tracking real-world fulfilment of shop debits
//! - group membership

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod catalog;
mod group;
mod ids;
mod ledger;
mod purchase;

pub use catalog::{
    Award, AwardError, CompletionPolicy, PolicyKind, ShopItem, ShopItemDraft, ShopItemFields, Task,
    TaskDraft, TaskFields, UnknownPolicyKind,
};
pub use group::Group;
pub use ids::{EventId, GroupId, PurchaseId, ShopItemId, TaskId, UserId};
pub use ledger::{
    fold_balance, EventAppend, LedgerEvent, SourceType, TaskCompletionRecord, UnknownSourceType,
};
pub use purchase::{PurchaseAppend, PurchaseHistoryRecord, PurchaseReceipt, PurchaseRecord};

/// Resolve the title/description shown for a historical event.
///
/// The event's own snapshot wins. Rows written before snapshots existed carry
/// an empty description and fall back to the live catalog entry, and when
/// that is gone too the placeholder is used.
pub fn resolve_snapshot(
    description: &str,
    notes: &str,
    live: Option<(&str, &str)>,
    placeholder: (&str, &str),
) -> (String, String) {
    if !description.is_empty() {
        return (description.to_string(), notes.to_string());
    }
    match live {
        Some((title, body)) => (title.to_string(), body.to_string()),
        None => (placeholder.0.to_string(), placeholder.1.to_string()),
    }
}
