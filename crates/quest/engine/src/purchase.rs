use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult, StorageContext};
use crate::groups::ensure_member;
use crate::lanes::WriteLanes;
use crate::outcome::{CatalogEntryRef, Outcome, SideEffectWarning};
use chrono::Utc;
use quest_storage::QuestStorage;
use quest_types::{PurchaseAppend, PurchaseId, PurchaseReceipt, PurchaseRecord, ShopItemId, UserId};
use std::sync::Arc;
use tracing::{debug, info};

/// Shop purchases and their fulfilment state.
///
/// The balance check, debit and purchase record are written by one storage
/// transaction (`LedgerStore::append_purchase`), and the call additionally
/// runs inside the group's write lane.
#[derive(Clone)]
pub struct PurchaseEngine {
    storage: Arc<dyn QuestStorage>,
    catalog: Catalog,
    lanes: Arc<WriteLanes>,
}

impl PurchaseEngine {
    pub fn new(storage: Arc<dyn QuestStorage>, catalog: Catalog, lanes: Arc<WriteLanes>) -> Self {
        Self {
            storage,
            catalog,
            lanes,
        }
    }

    /// Buy `item_id` as `actor`.
    pub async fn buy(
        &self,
        actor: UserId,
        item_id: ShopItemId,
    ) -> EngineResult<Outcome<PurchaseReceipt>> {
        let item = self.catalog.get_shop_item(item_id).await?;
        ensure_member(self.storage.as_ref(), actor, item.group_id).await?;

        let _lane = self.lanes.acquire(item.group_id).await;
        let item = self.catalog.get_shop_item(item_id).await?;

        let (event, purchase) = self
            .storage
            .append_purchase(PurchaseAppend::for_item(actor, &item))
            .await
            .context("append purchase")
            .inspect_err(|err| {
                if let EngineError::InsufficientFunds { have, need } = err {
                    debug!(actor = %actor, item = %item_id, have, need, "Purchase rejected");
                }
            })?;
        info!(
            actor = %actor,
            group = %item.group_id,
            item = %item_id,
            event = %event.id,
            purchase = %purchase.id,
            cost = item.cost,
            "Shop item purchased"
        );

        let mut outcome = Outcome::new(PurchaseReceipt { event, purchase });
        if item.is_one_time {
            if let Err(err) = self.catalog.remove_shop_item(item_id).await {
                outcome.warn(SideEffectWarning::CatalogEntryNotRemoved {
                    entry: CatalogEntryRef::ShopItem(item_id),
                    reason: err.to_string(),
                });
            }
        }
        Ok(outcome)
    }

    /// Record that a purchase was handed over in the real world.
    ///
    /// Any member of the purchase's group may do this.
    pub async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        actor: UserId,
        notes: &str,
    ) -> EngineResult<PurchaseRecord> {
        let purchase = self.get_purchase(purchase_id).await?;
        ensure_member(self.storage.as_ref(), actor, purchase.group_id).await?;

        let record = self
            .storage
            .mark_fulfilled(purchase_id, actor, notes.trim().to_string(), Utc::now())
            .await
            .context("mark purchase fulfilled")?;
        info!(purchase = %purchase_id, fulfilled_by = %actor, "Purchase fulfilled");
        Ok(record)
    }

    pub async fn get_purchase(&self, purchase_id: PurchaseId) -> EngineResult<PurchaseRecord> {
        self.storage
            .get_purchase(purchase_id)
            .await
            .context("load purchase")?
            .ok_or_else(|| EngineError::not_found(format!("purchase {purchase_id}")))
    }
}
