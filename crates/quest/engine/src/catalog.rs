//! Task and shop item CRUD with uniform validation.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StorageContext};
use crate::journal::{JournalMiss, RecentlyDeleted};
use chrono::{Duration, Utc};
use quest_storage::{QuestStorage, StorageResult};
use quest_types::{
    CompletionPolicy, GroupId, PolicyKind, ShopItem, ShopItemDraft, ShopItemFields, ShopItemId,
    Task, TaskDraft, TaskFields, TaskId,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

type Journal<K, V> = Arc<Mutex<RecentlyDeleted<K, V>>>;

/// Catalog service. Cheap to clone; clones share the restore journal.
#[derive(Clone)]
pub struct Catalog {
    storage: Arc<dyn QuestStorage>,
    default_quantity: i64,
    deleted_tasks: Journal<TaskId, Task>,
    deleted_items: Journal<ShopItemId, ShopItem>,
}

fn lock<K, V>(journal: &Mutex<RecentlyDeleted<K, V>>) -> MutexGuard<'_, RecentlyDeleted<K, V>> {
    journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn validate_title(title: &str) -> EngineResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::InvalidArgument(
            "title must not be empty".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn validate_positive(field: &str, value: i64) -> EngineResult<i64> {
    if value <= 0 {
        return Err(EngineError::InvalidArgument(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(value)
}

fn restore_miss(what: String, miss: JournalMiss) -> EngineError {
    match miss {
        JournalMiss::Absent => EngineError::NotFound(format!("{what} is not restorable")),
        JournalMiss::Expired => {
            EngineError::NotFound(format!("{what} restore window has expired"))
        }
    }
}

impl Catalog {
    pub fn new(storage: Arc<dyn QuestStorage>, config: &EngineConfig) -> Self {
        let ttl = Duration::from_std(config.restore_window()).unwrap_or(Duration::MAX);
        Self {
            storage,
            default_quantity: config.default_quantity,
            deleted_tasks: Arc::new(Mutex::new(RecentlyDeleted::new(
                ttl,
                config.restore_capacity,
            ))),
            deleted_items: Arc::new(Mutex::new(RecentlyDeleted::new(
                ttl,
                config.restore_capacity,
            ))),
        }
    }

    /// Validate a task draft into storable fields.
    pub fn task_fields(&self, draft: TaskDraft) -> EngineResult<TaskFields> {
        let title = validate_title(&draft.title)?;
        let reward_value = validate_positive("reward value", draft.reward_value)?;
        let policy = match draft.kind {
            PolicyKind::Boolean => CompletionPolicy::Boolean,
            PolicyKind::Integer => CompletionPolicy::Integer {
                default_quantity: draft
                    .default_quantity
                    .filter(|q| *q > 0)
                    .unwrap_or(self.default_quantity),
            },
        };
        Ok(TaskFields {
            title,
            description: draft.description.trim().to_string(),
            policy,
            reward_value,
            is_one_time: draft.is_one_time,
            due_at: draft.due_at,
        })
    }

    /// Validate a shop item draft into storable fields.
    pub fn shop_item_fields(&self, draft: ShopItemDraft) -> EngineResult<ShopItemFields> {
        Ok(ShopItemFields {
            title: validate_title(&draft.title)?,
            description: draft.description.trim().to_string(),
            cost: validate_positive("cost", draft.cost)?,
            is_one_time: draft.is_one_time,
        })
    }

    pub async fn create_task(&self, group_id: GroupId, draft: TaskDraft) -> EngineResult<Task> {
        let fields = self.task_fields(draft)?;
        let task = self
            .storage
            .insert_task(group_id, fields)
            .await
            .context("create task")?;
        info!(group = %group_id, task = %task.id, kind = %task.policy.kind(), "Task created");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: TaskId) -> EngineResult<Task> {
        self.storage
            .get_task(task_id)
            .await
            .context("load task")?
            .ok_or_else(|| EngineError::not_found(format!("task {task_id}")))
    }

    pub async fn list_tasks(&self, group_id: GroupId) -> EngineResult<Vec<Task>> {
        self.storage.list_tasks(group_id).await.context("list tasks")
    }

    pub async fn update_task(&self, task_id: TaskId, draft: TaskDraft) -> EngineResult<Task> {
        let fields = self.task_fields(draft)?;
        let task = self
            .storage
            .update_task(task_id, fields)
            .await
            .context("update task")?;
        debug!(task = %task_id, "Task updated");
        Ok(task)
    }

    /// Delete a task. It stays restorable for the configured window.
    pub async fn delete_task(&self, task_id: TaskId) -> EngineResult<Task> {
        let task = self.remove_task(task_id).await.context("delete task")?;
        info!(task = %task_id, group = %task.group_id, "Task deleted");
        Ok(task)
    }

    pub async fn restore_task(&self, task_id: TaskId) -> EngineResult<Task> {
        let (task, deleted_at) = lock(&self.deleted_tasks)
            .take_stamped(&task_id, Utc::now())
            .map_err(|miss| restore_miss(format!("task {task_id}"), miss))?;
        let task = match self.storage.restore_task(task.clone()).await {
            Ok(task) => task,
            Err(err) => {
                lock(&self.deleted_tasks).stash(task_id, task, deleted_at);
                return Err(EngineError::storage("restore task", err));
            }
        };
        info!(task = %task_id, "Task restored");
        Ok(task)
    }

    /// Remove a one-time task after its completion. Storage errors are
    /// returned raw so the caller can downgrade them to warnings.
    pub(crate) async fn remove_task(&self, task_id: TaskId) -> StorageResult<Task> {
        let task = self.storage.delete_task(task_id).await?;
        let now = Utc::now();
        let mut journal = lock(&self.deleted_tasks);
        journal.purge_expired(now);
        journal.stash(task_id, task.clone(), now);
        Ok(task)
    }

    pub async fn create_shop_item(
        &self,
        group_id: GroupId,
        draft: ShopItemDraft,
    ) -> EngineResult<ShopItem> {
        let fields = self.shop_item_fields(draft)?;
        let item = self
            .storage
            .insert_shop_item(group_id, fields)
            .await
            .context("create shop item")?;
        info!(group = %group_id, item = %item.id, cost = item.cost, "Shop item created");
        Ok(item)
    }

    pub async fn get_shop_item(&self, item_id: ShopItemId) -> EngineResult<ShopItem> {
        self.storage
            .get_shop_item(item_id)
            .await
            .context("load shop item")?
            .ok_or_else(|| EngineError::not_found(format!("shop item {item_id}")))
    }

    pub async fn list_shop_items(&self, group_id: GroupId) -> EngineResult<Vec<ShopItem>> {
        self.storage
            .list_shop_items(group_id)
            .await
            .context("list shop items")
    }

    pub async fn update_shop_item(
        &self,
        item_id: ShopItemId,
        draft: ShopItemDraft,
    ) -> EngineResult<ShopItem> {
        let fields = self.shop_item_fields(draft)?;
        let item = self
            .storage
            .update_shop_item(item_id, fields)
            .await
            .context("update shop item")?;
        debug!(item = %item_id, "Shop item updated");
        Ok(item)
    }

    pub async fn delete_shop_item(&self, item_id: ShopItemId) -> EngineResult<ShopItem> {
        let item = self
            .remove_shop_item(item_id)
            .await
            .context("delete shop item")?;
        info!(item = %item_id, group = %item.group_id, "Shop item deleted");
        Ok(item)
    }

    pub async fn restore_shop_item(&self, item_id: ShopItemId) -> EngineResult<ShopItem> {
        let (item, deleted_at) = lock(&self.deleted_items)
            .take_stamped(&item_id, Utc::now())
            .map_err(|miss| restore_miss(format!("shop item {item_id}"), miss))?;
        let item = match self.storage.restore_shop_item(item.clone()).await {
            Ok(item) => item,
            Err(err) => {
                lock(&self.deleted_items).stash(item_id, item, deleted_at);
                return Err(EngineError::storage("restore shop item", err));
            }
        };
        info!(item = %item_id, "Shop item restored");
        Ok(item)
    }

    pub(crate) async fn remove_shop_item(&self, item_id: ShopItemId) -> StorageResult<ShopItem> {
        let item = self.storage.delete_shop_item(item_id).await?;
        let now = Utc::now();
        let mut journal = lock(&self.deleted_items);
        journal.purge_expired(now);
        journal.stash(item_id, item.clone(), now);
        Ok(item)
    }
}
