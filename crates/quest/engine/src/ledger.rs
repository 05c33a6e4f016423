use crate::error::{EngineError, EngineResult, StorageContext};
use crate::groups::ensure_member;
use crate::lanes::WriteLanes;
use quest_storage::QuestStorage;
use quest_types::{
    EventAppend, EventId, GroupId, LedgerEvent, PurchaseHistoryRecord, PurchaseRecord,
    TaskCompletionRecord, UserId,
};
use std::sync::Arc;
use tracing::info;

const DEFAULT_ADJUSTMENT_DESCRIPTION: &str = "Manual adjustment";

/// Balances, histories and manual adjustments.
#[derive(Clone)]
pub struct LedgerView {
    storage: Arc<dyn QuestStorage>,
    lanes: Arc<WriteLanes>,
}

impl LedgerView {
    pub fn new(storage: Arc<dyn QuestStorage>, lanes: Arc<WriteLanes>) -> Self {
        Self { storage, lanes }
    }

    /// Sum of all event amounts for the pair. Zero when there are none.
    pub async fn balance_of(&self, actor: UserId, group_id: GroupId) -> EngineResult<i64> {
        self.storage
            .balance_of(actor, group_id)
            .await
            .context("compute balance")
    }

    /// Newest first.
    pub async fn history_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<LedgerEvent>> {
        self.storage
            .history_of(actor, group_id)
            .await
            .context("load history")
    }

    pub async fn get_event(&self, event_id: EventId) -> EngineResult<LedgerEvent> {
        self.storage
            .get_event(event_id)
            .await
            .context("load event")?
            .ok_or_else(|| EngineError::not_found(format!("event {event_id}")))
    }

    pub async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<TaskCompletionRecord>> {
        self.storage
            .task_completion_history(actor, group_id)
            .await
            .context("load task completion history")
    }

    pub async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<PurchaseHistoryRecord>> {
        self.storage
            .purchase_history(actor, group_id)
            .await
            .context("load purchase history")
    }

    /// Every purchase in the group, newest first.
    pub async fn group_purchases(&self, group_id: GroupId) -> EngineResult<Vec<PurchaseRecord>> {
        self.storage
            .purchases_in_group(group_id)
            .await
            .context("list group purchases")
    }

    /// Append a `Manual` event for `actor`.
    ///
    /// Not balance-checked, so a negative adjustment may take the balance
    /// below zero.
    pub async fn adjust(
        &self,
        actor: UserId,
        group_id: GroupId,
        amount: i64,
        description: &str,
    ) -> EngineResult<LedgerEvent> {
        if amount == 0 {
            return Err(EngineError::InvalidArgument(
                "adjustment amount must not be zero".to_string(),
            ));
        }
        ensure_member(self.storage.as_ref(), actor, group_id).await?;

        let description = match description.trim() {
            "" => DEFAULT_ADJUSTMENT_DESCRIPTION,
            text => text,
        };
        let _lane = self.lanes.acquire(group_id).await;
        let event = self
            .storage
            .append_event(EventAppend::manual(actor, group_id, amount, description))
            .await
            .context("append adjustment event")?;
        info!(actor = %actor, group = %group_id, event = %event.id, amount, "Balance adjusted");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use quest_storage::{GroupStore, InMemoryQuestStorage};
    use quest_types::SourceType;

    #[tokio::test]
    async fn adjustments_are_manual_events() {
        let storage: Arc<dyn QuestStorage> = Arc::new(InMemoryQuestStorage::new());
        let group = storage
            .create_group("Home".into(), "1234123412341234".into())
            .await
            .unwrap();
        storage.add_member(group.id, UserId(1)).await.unwrap();
        let ledger = LedgerView::new(storage, Arc::new(WriteLanes::new(true)));

        let event = ledger.adjust(UserId(1), group.id, -3, "  ").await.unwrap();
        assert_eq!(event.source_type, SourceType::Manual);
        assert_eq!(event.source_id, None);
        assert_eq!(event.description, "Manual adjustment");
        assert_eq!(ledger.balance_of(UserId(1), group.id).await.unwrap(), -3);

        let err = ledger.adjust(UserId(1), group.id, 0, "noop").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = ledger.adjust(UserId(5), group.id, 4, "gift").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert_eq!(ledger.get_event(event.id).await.unwrap(), event);
        assert_eq!(
            ledger.get_event(EventId(99)).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn adjustment_past_i64_max_is_rejected() {
        let storage: Arc<dyn QuestStorage> = Arc::new(InMemoryQuestStorage::new());
        let group = storage
            .create_group("Home".into(), "5678567856785678".into())
            .await
            .unwrap();
        storage.add_member(group.id, UserId(1)).await.unwrap();
        let ledger = LedgerView::new(storage, Arc::new(WriteLanes::new(true)));

        ledger.adjust(UserId(1), group.id, i64::MAX, "cap").await.unwrap();
        let err = ledger.adjust(UserId(1), group.id, 1, "over").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ledger.balance_of(UserId(1), group.id).await.unwrap(), i64::MAX);
    }
}
