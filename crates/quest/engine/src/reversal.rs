use crate::error::{EngineError, EngineResult, StorageContext};
use crate::groups::ensure_member;
use crate::lanes::WriteLanes;
use crate::outcome::{Outcome, SideEffectWarning};
use chrono::Utc;
use quest_storage::QuestStorage;
use quest_types::{EventId, LedgerEvent, UserId};
use std::sync::Arc;
use tracing::{debug, info};

/// Compensates a recorded event by appending its negation.
///
/// History is never touched. Undo is not idempotent: undoing the same event
/// twice appends two reversals.
#[derive(Clone)]
pub struct ReversalEngine {
    storage: Arc<dyn QuestStorage>,
    lanes: Arc<WriteLanes>,
}

impl ReversalEngine {
    pub fn new(storage: Arc<dyn QuestStorage>, lanes: Arc<WriteLanes>) -> Self {
        Self { storage, lanes }
    }

    /// Undo `event_id` on behalf of its owner. Returns the reversal event.
    pub async fn undo(
        &self,
        actor: UserId,
        event_id: EventId,
    ) -> EngineResult<Outcome<LedgerEvent>> {
        let original = self
            .storage
            .get_event(event_id)
            .await
            .context("load event")?
            .ok_or_else(|| EngineError::not_found(format!("event {event_id}")))?;

        if original.actor != actor {
            debug!(actor = %actor, owner = %original.actor, event = %event_id, "Undo rejected");
            return Err(EngineError::Forbidden("not your transaction".to_string()));
        }
        ensure_member(self.storage.as_ref(), actor, original.group_id).await?;
        let compensation = original.reversal_append().ok_or_else(|| {
            EngineError::InvalidArgument(format!("event {event_id} amount cannot be negated"))
        })?;

        let _lane = self.lanes.acquire(original.group_id).await;
        let reversal = self
            .storage
            .append_event(compensation)
            .await
            .context("append reversal event")?;
        info!(
            actor = %actor,
            group = %original.group_id,
            event = %event_id,
            reversal = %reversal.id,
            amount = reversal.amount,
            "Event reversed"
        );

        let mut outcome = Outcome::new(reversal);
        if original.is_purchase_debit() {
            match self.storage.cancel_by_event(event_id, Utc::now()).await {
                Ok(Some(purchase)) => {
                    debug!(purchase = %purchase.id, event = %event_id, "Purchase cancelled");
                }
                Ok(None) => outcome.warn(SideEffectWarning::PurchaseNotCancelled {
                    event_id,
                    reason: "no open purchase record".to_string(),
                }),
                Err(err) => outcome.warn(SideEffectWarning::PurchaseNotCancelled {
                    event_id,
                    reason: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}
