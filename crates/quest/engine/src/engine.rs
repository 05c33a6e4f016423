use crate::catalog::Catalog;
use crate::completion::CompletionEngine;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::groups::GroupDirectory;
use crate::lanes::WriteLanes;
use crate::ledger::LedgerView;
use crate::outcome::Outcome;
use crate::purchase::PurchaseEngine;
use crate::reversal::ReversalEngine;
use quest_storage::{InMemoryQuestStorage, QuestStorage};
use quest_types::{
    EventId, Group, GroupId, LedgerEvent, PurchaseHistoryRecord, PurchaseId, PurchaseReceipt,
    PurchaseRecord, ShopItemId, TaskCompletionRecord, TaskId, UserId,
};
use std::sync::Arc;

/// The ledger core as presentation layers see it.
///
/// All components share one storage backend and one set of write lanes.
#[derive(Clone)]
pub struct QuestEngine {
    storage: Arc<dyn QuestStorage>,
    config: EngineConfig,
    catalog: Catalog,
    completion: CompletionEngine,
    purchases: PurchaseEngine,
    reversal: ReversalEngine,
    ledger: LedgerView,
    groups: GroupDirectory,
}

impl QuestEngine {
    /// Create an engine backed by an explicit storage adapter.
    pub fn new(storage: Arc<dyn QuestStorage>, config: EngineConfig) -> Self {
        let lanes = Arc::new(WriteLanes::new(config.serialize_group_writes));
        let catalog = Catalog::new(Arc::clone(&storage), &config);
        Self {
            completion: CompletionEngine::new(
                Arc::clone(&storage),
                catalog.clone(),
                Arc::clone(&lanes),
            ),
            purchases: PurchaseEngine::new(
                Arc::clone(&storage),
                catalog.clone(),
                Arc::clone(&lanes),
            ),
            reversal: ReversalEngine::new(Arc::clone(&storage), Arc::clone(&lanes)),
            ledger: LedgerView::new(Arc::clone(&storage), lanes),
            groups: GroupDirectory::new(Arc::clone(&storage)),
            catalog,
            storage,
            config,
        }
    }

    /// Create an engine backed by in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryQuestStorage::new()), EngineConfig::default())
    }

    /// Access the underlying storage backend.
    pub fn storage(&self) -> Arc<dyn QuestStorage> {
        Arc::clone(&self.storage)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn completion(&self) -> &CompletionEngine {
        &self.completion
    }

    pub fn purchases(&self) -> &PurchaseEngine {
        &self.purchases
    }

    pub fn reversal(&self) -> &ReversalEngine {
        &self.reversal
    }

    pub fn ledger(&self) -> &LedgerView {
        &self.ledger
    }

    pub fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    pub async fn complete(
        &self,
        actor: UserId,
        task_id: TaskId,
        quantity: Option<i64>,
    ) -> EngineResult<Outcome<LedgerEvent>> {
        self.completion.complete(actor, task_id, quantity).await
    }

    pub async fn buy(
        &self,
        actor: UserId,
        item_id: ShopItemId,
    ) -> EngineResult<Outcome<PurchaseReceipt>> {
        self.purchases.buy(actor, item_id).await
    }

    pub async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        actor: UserId,
        notes: &str,
    ) -> EngineResult<PurchaseRecord> {
        self.purchases
            .mark_fulfilled(purchase_id, actor, notes)
            .await
    }

    pub async fn undo(
        &self,
        actor: UserId,
        event_id: EventId,
    ) -> EngineResult<Outcome<LedgerEvent>> {
        self.reversal.undo(actor, event_id).await
    }

    pub async fn adjust(
        &self,
        actor: UserId,
        group_id: GroupId,
        amount: i64,
        description: &str,
    ) -> EngineResult<LedgerEvent> {
        self.ledger.adjust(actor, group_id, amount, description).await
    }

    pub async fn balance_of(&self, actor: UserId, group_id: GroupId) -> EngineResult<i64> {
        self.ledger.balance_of(actor, group_id).await
    }

    pub async fn history_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<LedgerEvent>> {
        self.ledger.history_of(actor, group_id).await
    }

    pub async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<TaskCompletionRecord>> {
        self.ledger.task_completion_history(actor, group_id).await
    }

    pub async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> EngineResult<Vec<PurchaseHistoryRecord>> {
        self.ledger.purchase_history(actor, group_id).await
    }

    pub async fn group_purchases(&self, group_id: GroupId) -> EngineResult<Vec<PurchaseRecord>> {
        self.ledger.group_purchases(group_id).await
    }

    pub async fn create_group(&self, name: &str, creator: UserId) -> EngineResult<Group> {
        self.groups.create_group(name, creator).await
    }

    pub async fn join_group(&self, user: UserId, invite_code: &str) -> EngineResult<Group> {
        self.groups.join_group(user, invite_code).await
    }

    pub async fn groups_of(&self, user: UserId) -> EngineResult<Vec<Group>> {
        self.groups.groups_of(user).await
    }

    pub async fn members_of(&self, group_id: GroupId) -> EngineResult<Vec<UserId>> {
        self.groups.members_of(group_id).await
    }
}
