//! Storage wrapper that fails catalog deletes or restores on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_storage::{
    CatalogStore, GroupStore, InMemoryQuestStorage, LedgerStore, MembershipOracle, PurchaseStore,
    StorageError, StorageResult,
};
use quest_types::{
    EventAppend, EventId, Group, GroupId, LedgerEvent, PurchaseAppend, PurchaseHistoryRecord,
    PurchaseId, PurchaseRecord, ShopItem, ShopItemFields, ShopItemId, Task, TaskCompletionRecord,
    TaskFields, TaskId, UserId,
};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub(crate) struct FaultyCatalogStorage {
    inner: InMemoryQuestStorage,
    fail_deletes: AtomicBool,
    fail_restores: AtomicBool,
}

impl FaultyCatalogStorage {
    pub(crate) fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_restores(&self, on: bool) {
        self.fail_restores.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FaultyCatalogStorage {
    async fn append_event(&self, event: EventAppend) -> StorageResult<LedgerEvent> {
        self.inner.append_event(event).await
    }

    async fn get_event(&self, event_id: EventId) -> StorageResult<Option<LedgerEvent>> {
        self.inner.get_event(event_id).await
    }

    async fn balance_of(&self, actor: UserId, group_id: GroupId) -> StorageResult<i64> {
        self.inner.balance_of(actor, group_id).await
    }

    async fn history_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<LedgerEvent>> {
        self.inner.history_of(actor, group_id).await
    }

    async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<TaskCompletionRecord>> {
        self.inner.task_completion_history(actor, group_id).await
    }

    async fn append_purchase(
        &self,
        purchase: PurchaseAppend,
    ) -> StorageResult<(LedgerEvent, PurchaseRecord)> {
        self.inner.append_purchase(purchase).await
    }
}

#[async_trait]
impl PurchaseStore for FaultyCatalogStorage {
    async fn get_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        self.inner.get_purchase(purchase_id).await
    }

    async fn purchase_for_event(
        &self,
        event_id: EventId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        self.inner.purchase_for_event(event_id).await
    }

    async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        fulfilled_by: UserId,
        notes: String,
        at: DateTime<Utc>,
    ) -> StorageResult<PurchaseRecord> {
        self.inner
            .mark_fulfilled(purchase_id, fulfilled_by, notes, at)
            .await
    }

    async fn cancel_by_event(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PurchaseRecord>> {
        self.inner.cancel_by_event(event_id, at).await
    }

    async fn purchases_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseRecord>> {
        self.inner.purchases_of(actor, group_id).await
    }

    async fn purchases_in_group(&self, group_id: GroupId) -> StorageResult<Vec<PurchaseRecord>> {
        self.inner.purchases_in_group(group_id).await
    }

    async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseHistoryRecord>> {
        self.inner.purchase_history(actor, group_id).await
    }
}

#[async_trait]
impl CatalogStore for FaultyCatalogStorage {
    async fn insert_task(&self, group_id: GroupId, fields: TaskFields) -> StorageResult<Task> {
        self.inner.insert_task(group_id, fields).await
    }

    async fn get_task(&self, task_id: TaskId) -> StorageResult<Option<Task>> {
        self.inner.get_task(task_id).await
    }

    async fn list_tasks(&self, group_id: GroupId) -> StorageResult<Vec<Task>> {
        self.inner.list_tasks(group_id).await
    }

    async fn update_task(&self, task_id: TaskId, fields: TaskFields) -> StorageResult<Task> {
        self.inner.update_task(task_id, fields).await
    }

    async fn delete_task(&self, task_id: TaskId) -> StorageResult<Task> {
        Self::check(&self.fail_deletes, "task delete")?;
        self.inner.delete_task(task_id).await
    }

    async fn restore_task(&self, task: Task) -> StorageResult<Task> {
        Self::check(&self.fail_restores, "task restore")?;
        self.inner.restore_task(task).await
    }

    async fn insert_shop_item(
        &self,
        group_id: GroupId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        self.inner.insert_shop_item(group_id, fields).await
    }

    async fn get_shop_item(&self, item_id: ShopItemId) -> StorageResult<Option<ShopItem>> {
        self.inner.get_shop_item(item_id).await
    }

    async fn list_shop_items(&self, group_id: GroupId) -> StorageResult<Vec<ShopItem>> {
        self.inner.list_shop_items(group_id).await
    }

    async fn update_shop_item(
        &self,
        item_id: ShopItemId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        self.inner.update_shop_item(item_id, fields).await
    }

    async fn delete_shop_item(&self, item_id: ShopItemId) -> StorageResult<ShopItem> {
        Self::check(&self.fail_deletes, "shop item delete")?;
        self.inner.delete_shop_item(item_id).await
    }

    async fn restore_shop_item(&self, item: ShopItem) -> StorageResult<ShopItem> {
        Self::check(&self.fail_restores, "shop item restore")?;
        self.inner.restore_shop_item(item).await
    }
}

#[async_trait]
impl MembershipOracle for FaultyCatalogStorage {
    async fn is_member(&self, user: UserId, group_id: GroupId) -> StorageResult<bool> {
        self.inner.is_member(user, group_id).await
    }
}

#[async_trait]
impl GroupStore for FaultyCatalogStorage {
    async fn create_group(&self, name: String, invite_code: String) -> StorageResult<Group> {
        self.inner.create_group(name, invite_code).await
    }

    async fn get_group(&self, group_id: GroupId) -> StorageResult<Option<Group>> {
        self.inner.get_group(group_id).await
    }

    async fn group_by_invite_code(&self, invite_code: &str) -> StorageResult<Option<Group>> {
        self.inner.group_by_invite_code(invite_code).await
    }

    async fn add_member(&self, group_id: GroupId, user: UserId) -> StorageResult<()> {
        self.inner.add_member(group_id, user).await
    }

    async fn groups_of(&self, user: UserId) -> StorageResult<Vec<Group>> {
        self.inner.groups_of(user).await
    }

    async fn members_of(&self, group_id: GroupId) -> StorageResult<Vec<UserId>> {
        self.inner.members_of(group_id).await
    }
}
