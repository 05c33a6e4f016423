use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_types::{
    EventAppend, EventId, Group, GroupId, LedgerEvent, PurchaseAppend, PurchaseHistoryRecord,
    PurchaseId, PurchaseRecord, ShopItem, ShopItemFields, ShopItemId, Task, TaskCompletionRecord,
    TaskFields, TaskId, UserId,
};

/// Append-only ledger of balance-affecting events.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist one immutable event, assigning a monotonically increasing id
    /// and the creation timestamp. No business validation happens here;
    /// `InvalidInput` only when the pair's balance would leave the `i64` range.
    async fn append_event(&self, event: EventAppend) -> StorageResult<LedgerEvent>;

    async fn get_event(&self, event_id: EventId) -> StorageResult<Option<LedgerEvent>>;

    /// Sum of amounts for the pair; 0 when there are no events.
    async fn balance_of(&self, actor: UserId, group_id: GroupId) -> StorageResult<i64>;

    /// Events for the pair, newest first (descending id).
    async fn history_of(&self, actor: UserId, group_id: GroupId)
        -> StorageResult<Vec<LedgerEvent>>;

    /// Task-sourced events for the pair joined with the live task row.
    async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<TaskCompletionRecord>>;

    /// Check the balance, append the debit and create its purchase record in
    /// one storage transaction.
    ///
    /// Fails with `InsufficientBalance` without writing anything when the
    /// balance is below `purchase.cost`.
    async fn append_purchase(
        &self,
        purchase: PurchaseAppend,
    ) -> StorageResult<(LedgerEvent, PurchaseRecord)>;
}

/// Fulfilment tracking for shop debits.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn get_purchase(&self, purchase_id: PurchaseId)
        -> StorageResult<Option<PurchaseRecord>>;

    async fn purchase_for_event(&self, event_id: EventId)
        -> StorageResult<Option<PurchaseRecord>>;

    /// Set `fulfilled`, `fulfilled_at`, `fulfilled_by` and `notes`.
    async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        fulfilled_by: UserId,
        notes: String,
        at: DateTime<Utc>,
    ) -> StorageResult<PurchaseRecord>;

    /// Mark the open purchase record of `event_id` cancelled.
    ///
    /// Returns `None` when there is no record or it is already cancelled.
    async fn cancel_by_event(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PurchaseRecord>>;

    /// Purchases of one member, newest first.
    async fn purchases_of(&self, actor: UserId, group_id: GroupId)
        -> StorageResult<Vec<PurchaseRecord>>;

    /// All purchases in a group, newest first.
    async fn purchases_in_group(&self, group_id: GroupId) -> StorageResult<Vec<PurchaseRecord>>;

    async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseHistoryRecord>>;
}

/// Tasks and shop items, scoped to a group.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_task(&self, group_id: GroupId, fields: TaskFields) -> StorageResult<Task>;
    async fn get_task(&self, task_id: TaskId) -> StorageResult<Option<Task>>;
    /// Tasks of a group in ascending id order.
    async fn list_tasks(&self, group_id: GroupId) -> StorageResult<Vec<Task>>;
    async fn update_task(&self, task_id: TaskId, fields: TaskFields) -> StorageResult<Task>;
    /// Remove and return the row; `NotFound` when absent.
    async fn delete_task(&self, task_id: TaskId) -> StorageResult<Task>;
    /// Re-insert a previously deleted row under its original id.
    async fn restore_task(&self, task: Task) -> StorageResult<Task>;

    async fn insert_shop_item(
        &self,
        group_id: GroupId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem>;
    async fn get_shop_item(&self, item_id: ShopItemId) -> StorageResult<Option<ShopItem>>;
    async fn list_shop_items(&self, group_id: GroupId) -> StorageResult<Vec<ShopItem>>;
    async fn update_shop_item(
        &self,
        item_id: ShopItemId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem>;
    async fn delete_shop_item(&self, item_id: ShopItemId) -> StorageResult<ShopItem>;
    async fn restore_shop_item(&self, item: ShopItem) -> StorageResult<ShopItem>;
}

/// The only question the ledger asks about identity.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn is_member(&self, user: UserId, group_id: GroupId) -> StorageResult<bool>;
}

/// Group directory backing the membership oracle.
#[async_trait]
pub trait GroupStore: MembershipOracle {
    async fn create_group(&self, name: String, invite_code: String) -> StorageResult<Group>;
    async fn get_group(&self, group_id: GroupId) -> StorageResult<Option<Group>>;
    async fn group_by_invite_code(&self, invite_code: &str) -> StorageResult<Option<Group>>;
    /// `Conflict` when the user already belongs to the group.
    async fn add_member(&self, group_id: GroupId, user: UserId) -> StorageResult<()>;
    async fn groups_of(&self, user: UserId) -> StorageResult<Vec<Group>>;
    async fn members_of(&self, group_id: GroupId) -> StorageResult<Vec<UserId>>;
}

/// Unified storage bundle used by the engines.
pub trait QuestStorage:
    LedgerStore + PurchaseStore + CatalogStore + GroupStore + Send + Sync
{
}

impl<T> QuestStorage for T where
    T: LedgerStore + PurchaseStore + CatalogStore + GroupStore + Send + Sync
{
}
