//! In-memory reference implementation for the Quest storage traits.
//!
//! This adapter is deterministic and test-friendly. Events and purchase
//! records share one lock so `append_purchase` is atomic. Production
//! deployments should use the SQLite adapter.

use crate::traits::{CatalogStore, GroupStore, LedgerStore, MembershipOracle, PurchaseStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_types::{
    EventAppend, EventId, Group, GroupId, LedgerEvent, PurchaseAppend, PurchaseHistoryRecord,
    PurchaseId, PurchaseRecord, ShopItem, ShopItemFields, ShopItemId, SourceType, Task,
    TaskCompletionRecord, TaskFields, TaskId, UserId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

#[derive(Default)]
struct LedgerTables {
    events: Vec<LedgerEvent>,
    purchases: Vec<PurchaseRecord>,
}

impl LedgerTables {
    fn event(&self, event_id: EventId) -> Option<&LedgerEvent> {
        self.events.iter().find(|e| e.id == event_id)
    }

    fn balance(&self, actor: UserId, group_id: GroupId) -> StorageResult<i64> {
        self.events
            .iter()
            .filter(|e| e.actor == actor && e.group_id == group_id)
            .try_fold(0i64, |balance, e| balance.checked_add(e.amount))
            .ok_or_else(|| StorageError::InvalidInput("balance overflows i64".to_string()))
    }

    fn push_event(&mut self, append: EventAppend, at: DateTime<Utc>) -> LedgerEvent {
        let id = EventId(self.events.len() as i64 + 1);
        let event = append.into_event(id, at);
        self.events.push(event.clone());
        event
    }
}

#[derive(Default)]
struct CatalogTables {
    tasks: BTreeMap<TaskId, Task>,
    shop_items: BTreeMap<ShopItemId, ShopItem>,
    last_task_id: i64,
    last_shop_item_id: i64,
}

#[derive(Default)]
struct GroupTables {
    groups: BTreeMap<GroupId, Group>,
    members: BTreeMap<GroupId, BTreeSet<UserId>>,
}

/// In-memory Quest storage adapter.
#[derive(Default)]
pub struct InMemoryQuestStorage {
    ledger: RwLock<LedgerTables>,
    catalog: RwLock<CatalogTables>,
    groups: RwLock<GroupTables>,
}

impl InMemoryQuestStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

// Ids are handed out in write order, so they order events and purchases.
fn newest_first<T>(values: &mut [T], key: impl Fn(&T) -> i64) {
    values.sort_by_key(|v| std::cmp::Reverse(key(v)));
}

#[async_trait]
impl LedgerStore for InMemoryQuestStorage {
    async fn append_event(&self, event: EventAppend) -> StorageResult<LedgerEvent> {
        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        guard
            .balance(event.actor, event.group_id)?
            .checked_add(event.amount)
            .ok_or_else(|| StorageError::InvalidInput("balance overflows i64".to_string()))?;
        Ok(guard.push_event(event, Utc::now()))
    }

    async fn get_event(&self, event_id: EventId) -> StorageResult<Option<LedgerEvent>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(guard.event(event_id).cloned())
    }

    async fn balance_of(&self, actor: UserId, group_id: GroupId) -> StorageResult<i64> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        guard.balance(actor, group_id)
    }

    async fn history_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<LedgerEvent>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        let mut events = guard
            .events
            .iter()
            .filter(|e| e.actor == actor && e.group_id == group_id)
            .cloned()
            .collect::<Vec<_>>();
        newest_first(&mut events, |e| e.id.get());
        Ok(events)
    }

    async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<TaskCompletionRecord>> {
        let events = self
            .history_of(actor, group_id)
            .await?
            .into_iter()
            .filter(|e| e.source_type == SourceType::Task)
            .collect::<Vec<_>>();

        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(events
            .into_iter()
            .map(|event| {
                let task = event.task_id().and_then(|id| catalog.tasks.get(&id).cloned());
                TaskCompletionRecord::new(event, task)
            })
            .collect())
    }

    async fn append_purchase(
        &self,
        purchase: PurchaseAppend,
    ) -> StorageResult<(LedgerEvent, PurchaseRecord)> {
        if purchase.cost <= 0 {
            return Err(StorageError::InvalidInput(format!(
                "purchase cost must be positive, got {}",
                purchase.cost
            )));
        }

        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        let have = guard.balance(purchase.actor, purchase.group_id)?;
        if have < purchase.cost {
            return Err(StorageError::InsufficientBalance {
                have,
                need: purchase.cost,
            });
        }

        let now = Utc::now();
        let event = guard.push_event(
            EventAppend {
                actor: purchase.actor,
                group_id: purchase.group_id,
                amount: -purchase.cost,
                source_type: SourceType::ShopItem,
                source_id: Some(purchase.shop_item_id.get()),
                quantity: 1,
                description: purchase.description,
                notes: purchase.notes,
            },
            now,
        );
        let record = PurchaseRecord {
            id: PurchaseId(guard.purchases.len() as i64 + 1),
            event_id: event.id,
            actor: purchase.actor,
            group_id: purchase.group_id,
            shop_item_id: purchase.shop_item_id,
            fulfilled: false,
            fulfilled_at: None,
            fulfilled_by: None,
            notes: String::new(),
            cancelled_at: None,
            created_at: now,
        };
        guard.purchases.push(record.clone());
        Ok((event, record))
    }
}

#[async_trait]
impl PurchaseStore for InMemoryQuestStorage {
    async fn get_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(guard.purchases.iter().find(|p| p.id == purchase_id).cloned())
    }

    async fn purchase_for_event(
        &self,
        event_id: EventId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(guard
            .purchases
            .iter()
            .find(|p| p.event_id == event_id)
            .cloned())
    }

    async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        fulfilled_by: UserId,
        notes: String,
        at: DateTime<Utc>,
    ) -> StorageResult<PurchaseRecord> {
        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        let record = guard
            .purchases
            .iter_mut()
            .find(|p| p.id == purchase_id)
            .ok_or_else(|| StorageError::NotFound(format!("purchase {purchase_id} not found")))?;
        record.fulfilled = true;
        record.fulfilled_at = Some(at);
        record.fulfilled_by = Some(fulfilled_by);
        record.notes = notes;
        Ok(record.clone())
    }

    async fn cancel_by_event(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PurchaseRecord>> {
        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        let Some(record) = guard
            .purchases
            .iter_mut()
            .find(|p| p.event_id == event_id && p.cancelled_at.is_none())
        else {
            return Ok(None);
        };
        record.cancelled_at = Some(at);
        Ok(Some(record.clone()))
    }

    async fn purchases_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseRecord>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        let mut records = guard
            .purchases
            .iter()
            .filter(|p| p.actor == actor && p.group_id == group_id)
            .cloned()
            .collect::<Vec<_>>();
        newest_first(&mut records, |p| p.id.get());
        Ok(records)
    }

    async fn purchases_in_group(&self, group_id: GroupId) -> StorageResult<Vec<PurchaseRecord>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        let mut records = guard
            .purchases
            .iter()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect::<Vec<_>>();
        newest_first(&mut records, |p| p.id.get());
        Ok(records)
    }

    async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseHistoryRecord>> {
        let rows = {
            let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
            let mut rows = guard
                .purchases
                .iter()
                .filter(|p| p.actor == actor && p.group_id == group_id)
                .map(|p| (p.clone(), guard.event(p.event_id).cloned()))
                .collect::<Vec<_>>();
            newest_first(&mut rows, |(p, _)| p.id.get());
            rows
        };

        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(rows
            .into_iter()
            .map(|(purchase, event)| {
                let item = catalog.shop_items.get(&purchase.shop_item_id).cloned();
                let (description, notes) = event
                    .as_ref()
                    .map(|e| (e.description.as_str(), e.notes.as_str()))
                    .unwrap_or(("", ""));
                PurchaseHistoryRecord::new(purchase, description, notes, item)
            })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for InMemoryQuestStorage {
    async fn insert_task(&self, group_id: GroupId, fields: TaskFields) -> StorageResult<Task> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        guard.last_task_id += 1;
        let task = Task::from_fields(TaskId(guard.last_task_id), group_id, fields, Utc::now());
        guard.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: TaskId) -> StorageResult<Option<Task>> {
        let guard = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(guard.tasks.get(&task_id).cloned())
    }

    async fn list_tasks(&self, group_id: GroupId) -> StorageResult<Vec<Task>> {
        let guard = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(guard
            .tasks
            .values()
            .filter(|t| t.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn update_task(&self, task_id: TaskId, fields: TaskFields) -> StorageResult<Task> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        let task = guard
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))?;
        *task = Task::from_fields(task.id, task.group_id, fields, task.created_at);
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: TaskId) -> StorageResult<Task> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        guard
            .tasks
            .remove(&task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))
    }

    async fn restore_task(&self, task: Task) -> StorageResult<Task> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        if guard.tasks.contains_key(&task.id) {
            return Err(StorageError::Conflict(format!(
                "task {} already exists",
                task.id
            )));
        }
        guard.last_task_id = guard.last_task_id.max(task.id.get());
        guard.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn insert_shop_item(
        &self,
        group_id: GroupId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        guard.last_shop_item_id += 1;
        let item = ShopItem::from_fields(
            ShopItemId(guard.last_shop_item_id),
            group_id,
            fields,
            Utc::now(),
        );
        guard.shop_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_shop_item(&self, item_id: ShopItemId) -> StorageResult<Option<ShopItem>> {
        let guard = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(guard.shop_items.get(&item_id).cloned())
    }

    async fn list_shop_items(&self, group_id: GroupId) -> StorageResult<Vec<ShopItem>> {
        let guard = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(guard
            .shop_items
            .values()
            .filter(|i| i.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn update_shop_item(
        &self,
        item_id: ShopItemId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        let item = guard
            .shop_items
            .get_mut(&item_id)
            .ok_or_else(|| StorageError::NotFound(format!("shop item {item_id} not found")))?;
        *item = ShopItem::from_fields(item.id, item.group_id, fields, item.created_at);
        Ok(item.clone())
    }

    async fn delete_shop_item(&self, item_id: ShopItemId) -> StorageResult<ShopItem> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        guard
            .shop_items
            .remove(&item_id)
            .ok_or_else(|| StorageError::NotFound(format!("shop item {item_id} not found")))
    }

    async fn restore_shop_item(&self, item: ShopItem) -> StorageResult<ShopItem> {
        let mut guard = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        if guard.shop_items.contains_key(&item.id) {
            return Err(StorageError::Conflict(format!(
                "shop item {} already exists",
                item.id
            )));
        }
        guard.last_shop_item_id = guard.last_shop_item_id.max(item.id.get());
        guard.shop_items.insert(item.id, item.clone());
        Ok(item)
    }
}

#[async_trait]
impl MembershipOracle for InMemoryQuestStorage {
    async fn is_member(&self, user: UserId, group_id: GroupId) -> StorageResult<bool> {
        let guard = self.groups.read().map_err(|_| poisoned("groups"))?;
        Ok(guard
            .members
            .get(&group_id)
            .is_some_and(|members| members.contains(&user)))
    }
}

#[async_trait]
impl GroupStore for InMemoryQuestStorage {
    async fn create_group(&self, name: String, invite_code: String) -> StorageResult<Group> {
        let mut guard = self.groups.write().map_err(|_| poisoned("groups"))?;
        if guard.groups.values().any(|g| g.invite_code == invite_code) {
            return Err(StorageError::Conflict(format!(
                "invite code {invite_code} already in use"
            )));
        }
        let group = Group {
            id: GroupId(guard.groups.len() as i64 + 1),
            name,
            invite_code,
            created_at: Utc::now(),
        };
        guard.groups.insert(group.id, group.clone());
        guard.members.insert(group.id, BTreeSet::new());
        Ok(group)
    }

    async fn get_group(&self, group_id: GroupId) -> StorageResult<Option<Group>> {
        let guard = self.groups.read().map_err(|_| poisoned("groups"))?;
        Ok(guard.groups.get(&group_id).cloned())
    }

    async fn group_by_invite_code(&self, invite_code: &str) -> StorageResult<Option<Group>> {
        let guard = self.groups.read().map_err(|_| poisoned("groups"))?;
        Ok(guard
            .groups
            .values()
            .find(|g| g.invite_code == invite_code)
            .cloned())
    }

    async fn add_member(&self, group_id: GroupId, user: UserId) -> StorageResult<()> {
        let mut guard = self.groups.write().map_err(|_| poisoned("groups"))?;
        let members = guard
            .members
            .get_mut(&group_id)
            .ok_or_else(|| StorageError::NotFound(format!("group {group_id} not found")))?;
        if !members.insert(user) {
            return Err(StorageError::Conflict(format!(
                "user {user} is already a member of group {group_id}"
            )));
        }
        Ok(())
    }

    async fn groups_of(&self, user: UserId) -> StorageResult<Vec<Group>> {
        let guard = self.groups.read().map_err(|_| poisoned("groups"))?;
        Ok(guard
            .members
            .iter()
            .filter(|(_, members)| members.contains(&user))
            .filter_map(|(group_id, _)| guard.groups.get(group_id).cloned())
            .collect())
    }

    async fn members_of(&self, group_id: GroupId) -> StorageResult<Vec<UserId>> {
        let guard = self.groups.read().map_err(|_| poisoned("groups"))?;
        Ok(guard
            .members
            .get(&group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_types::CompletionPolicy;

    fn credit(actor: i64, group: i64, amount: i64) -> EventAppend {
        EventAppend::manual(UserId(actor), GroupId(group), amount, "seed")
    }

    fn fields(title: &str) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            description: String::new(),
            policy: CompletionPolicy::Boolean,
            reward_value: 10,
            is_one_time: false,
            due_at: None,
        }
    }

    #[tokio::test]
    async fn balance_is_scoped_per_user_and_group() {
        let storage = InMemoryQuestStorage::new();
        storage.append_event(credit(1, 1, 10)).await.unwrap();
        storage.append_event(credit(1, 2, 7)).await.unwrap();
        storage.append_event(credit(2, 1, 3)).await.unwrap();
        storage.append_event(credit(1, 1, -4)).await.unwrap();

        assert_eq!(storage.balance_of(UserId(1), GroupId(1)).await.unwrap(), 6);
        assert_eq!(storage.balance_of(UserId(1), GroupId(2)).await.unwrap(), 7);
        assert_eq!(storage.balance_of(UserId(9), GroupId(9)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn appends_that_overflow_the_balance_are_rejected() {
        let storage = InMemoryQuestStorage::new();
        storage.append_event(credit(1, 1, i64::MAX)).await.unwrap();

        let err = storage.append_event(credit(1, 1, 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(
            storage.balance_of(UserId(1), GroupId(1)).await.unwrap(),
            i64::MAX
        );
        assert_eq!(storage.history_of(UserId(1), GroupId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let storage = InMemoryQuestStorage::new();
        let first = storage.append_event(credit(1, 1, 10)).await.unwrap();
        let second = storage.append_event(credit(1, 1, 5)).await.unwrap();
        assert!(second.id > first.id);

        let history = storage.history_of(UserId(1), GroupId(1)).await.unwrap();
        let ids = history.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn append_purchase_rejects_without_writing() {
        let storage = InMemoryQuestStorage::new();
        storage.append_event(credit(1, 1, 10)).await.unwrap();

        let err = storage
            .append_purchase(PurchaseAppend {
                actor: UserId(1),
                group_id: GroupId(1),
                shop_item_id: ShopItemId(1),
                cost: 15,
                description: "Ice cream".into(),
                notes: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::InsufficientBalance { have: 10, need: 15 }
        ));
        assert_eq!(
            storage.history_of(UserId(1), GroupId(1)).await.unwrap().len(),
            1
        );
        assert!(storage
            .purchases_of(UserId(1), GroupId(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cancel_by_event_only_touches_open_records() {
        let storage = InMemoryQuestStorage::new();
        storage.append_event(credit(1, 1, 10)).await.unwrap();
        let (event, purchase) = storage
            .append_purchase(PurchaseAppend {
                actor: UserId(1),
                group_id: GroupId(1),
                shop_item_id: ShopItemId(3),
                cost: 5,
                description: "Sticker".into(),
                notes: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(event.amount, -5);
        assert_eq!(purchase.event_id, event.id);

        let cancelled = storage
            .cancel_by_event(event.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(cancelled.is_cancelled());
        assert!(storage
            .cancel_by_event(event.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn restore_reuses_original_id_and_conflicts_when_present() {
        let storage = InMemoryQuestStorage::new();
        let task = storage.insert_task(GroupId(1), fields("Walk")).await.unwrap();
        let removed = storage.delete_task(task.id).await.unwrap();
        assert!(storage.get_task(task.id).await.unwrap().is_none());

        let restored = storage.restore_task(removed.clone()).await.unwrap();
        assert_eq!(restored.id, task.id);
        assert!(matches!(
            storage.restore_task(removed).await,
            Err(StorageError::Conflict(_))
        ));

        let next = storage.insert_task(GroupId(1), fields("Run")).await.unwrap();
        assert!(next.id > task.id);
    }

    #[tokio::test]
    async fn membership_follows_add_member() {
        let storage = InMemoryQuestStorage::new();
        let group = storage
            .create_group("Home".into(), "abc".into())
            .await
            .unwrap();
        assert!(!storage.is_member(UserId(1), group.id).await.unwrap());

        storage.add_member(group.id, UserId(1)).await.unwrap();
        assert!(storage.is_member(UserId(1), group.id).await.unwrap());
        assert!(matches!(
            storage.add_member(group.id, UserId(1)).await,
            Err(StorageError::Conflict(_))
        ));
        assert_eq!(storage.groups_of(UserId(1)).await.unwrap(), vec![group]);
    }
}
