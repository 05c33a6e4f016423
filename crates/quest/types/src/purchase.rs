use crate::catalog::ShopItem;
use crate::ids::{EventId, GroupId, PurchaseId, ShopItemId, UserId};
use crate::ledger::LedgerEvent;
use crate::resolve_snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fulfilment tracking for one shop debit, independent of the monetary fact.
///
/// Never deleted. A reversed debit sets `cancelled_at` and leaves the
/// fulfilment fields as they were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    /// The debit event this record belongs to (1:1).
    pub event_id: EventId,
    pub actor: UserId,
    pub group_id: GroupId,
    pub shop_item_id: ShopItemId,
    pub fulfilled: bool,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub fulfilled_by: Option<UserId>,
    pub notes: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

/// Input to `LedgerStore::append_purchase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseAppend {
    pub actor: UserId,
    pub group_id: GroupId,
    pub shop_item_id: ShopItemId,
    /// Positive cost; the debit is recorded as `-cost`.
    pub cost: i64,
    pub description: String,
    pub notes: String,
}

impl PurchaseAppend {
    pub fn for_item(actor: UserId, item: &ShopItem) -> Self {
        Self {
            actor,
            group_id: item.group_id,
            shop_item_id: item.id,
            cost: item.cost,
            description: item.title.clone(),
            notes: item.description.clone(),
        }
    }
}

/// Result of a successful buy: the debit and its fulfilment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub event: LedgerEvent,
    pub purchase: PurchaseRecord,
}

/// A purchase prepared for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseHistoryRecord {
    pub purchase: PurchaseRecord,
    pub title: String,
    pub description: String,
    /// The live shop item, when it still exists.
    pub item: Option<ShopItem>,
}

impl PurchaseHistoryRecord {
    pub const DELETED_TITLE: &'static str = "[Deleted Item]";
    pub const DELETED_DESCRIPTION: &'static str = "This shop item has been deleted";

    /// `description`/`notes` are the snapshot carried by the debit event.
    pub fn new(
        purchase: PurchaseRecord,
        description: &str,
        notes: &str,
        item: Option<ShopItem>,
    ) -> Self {
        let (title, description) = resolve_snapshot(
            description,
            notes,
            item.as_ref()
                .map(|i| (i.title.as_str(), i.description.as_str())),
            (Self::DELETED_TITLE, Self::DELETED_DESCRIPTION),
        );
        Self {
            purchase,
            title,
            description,
            item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PurchaseRecord {
        PurchaseRecord {
            id: PurchaseId(1),
            event_id: EventId(3),
            actor: UserId(1),
            group_id: GroupId(1),
            shop_item_id: ShopItemId(2),
            fulfilled: false,
            fulfilled_at: None,
            fulfilled_by: None,
            notes: String::new(),
            cancelled_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_falls_back_to_deleted_placeholder() {
        let row = PurchaseHistoryRecord::new(record(), "", "", None);
        assert_eq!(row.title, "[Deleted Item]");
        assert_eq!(row.description, "This shop item has been deleted");
        assert!(!row.purchase.is_cancelled());
    }

    #[test]
    fn history_prefers_live_item_over_placeholder() {
        let item = ShopItem {
            id: ShopItemId(2),
            group_id: GroupId(1),
            title: "Movie night".into(),
            description: "pick the film".into(),
            cost: 30,
            is_one_time: false,
            created_at: Utc::now(),
        };
        let row = PurchaseHistoryRecord::new(record(), "", "", Some(item));
        assert_eq!(row.title, "Movie night");
        assert_eq!(row.description, "pick the film");
    }
}
