use crate::catalog::Catalog;
use crate::error::{EngineError, EngineResult, StorageContext};
use crate::groups::ensure_member;
use crate::lanes::WriteLanes;
use crate::outcome::{CatalogEntryRef, Outcome, SideEffectWarning};
use quest_storage::QuestStorage;
use quest_types::{EventAppend, LedgerEvent, TaskId, UserId};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns "actor completed task" into exactly one credit event per call.
///
/// Not idempotent: a repeatable task may be completed any number of times.
/// One-time tasks are removed after their first completion, which is what
/// makes a second completion fail with `NotFound`.
#[derive(Clone)]
pub struct CompletionEngine {
    storage: Arc<dyn QuestStorage>,
    catalog: Catalog,
    lanes: Arc<WriteLanes>,
}

impl CompletionEngine {
    pub fn new(storage: Arc<dyn QuestStorage>, catalog: Catalog, lanes: Arc<WriteLanes>) -> Self {
        Self {
            storage,
            catalog,
            lanes,
        }
    }

    /// Complete `task_id` as `actor`.
    ///
    /// `quantity` is ignored for boolean tasks and required (positive) for
    /// integer tasks.
    pub async fn complete(
        &self,
        actor: UserId,
        task_id: TaskId,
        quantity: Option<i64>,
    ) -> EngineResult<Outcome<LedgerEvent>> {
        let task = self.catalog.get_task(task_id).await?;
        ensure_member(self.storage.as_ref(), actor, task.group_id).await?;

        let _lane = self.lanes.acquire(task.group_id).await;
        // A concurrent writer may have consumed a one-time task meanwhile.
        let task = self.catalog.get_task(task_id).await?;

        let award = task
            .policy
            .award(task.reward_value, quantity)
            .map_err(|err| {
                debug!(task = %task_id, error = %err, "Completion rejected");
                EngineError::from(err)
            })?;

        let event = self
            .storage
            .append_event(EventAppend::task_completion(actor, &task, award))
            .await
            .context("append completion event")?;
        info!(
            actor = %actor,
            group = %task.group_id,
            task = %task_id,
            event = %event.id,
            amount = event.amount,
            quantity = event.quantity,
            "Task completed"
        );

        let mut outcome = Outcome::new(event);
        if task.is_one_time {
            if let Err(err) = self.catalog.remove_task(task_id).await {
                outcome.warn(SideEffectWarning::CatalogEntryNotRemoved {
                    entry: CatalogEntryRef::Task(task_id),
                    reason: err.to_string(),
                });
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::test_support::FaultyCatalogStorage;
    use quest_storage::{GroupStore, InMemoryQuestStorage, LedgerStore};
    use quest_types::{GroupId, SourceType, TaskDraft};

    async fn setup() -> (CompletionEngine, Catalog, Arc<dyn QuestStorage>, GroupId) {
        let storage: Arc<dyn QuestStorage> = Arc::new(InMemoryQuestStorage::new());
        let group = storage
            .create_group("Home".into(), "c0ffee00c0ffee00".into())
            .await
            .unwrap();
        storage.add_member(group.id, UserId(1)).await.unwrap();
        let catalog = Catalog::new(Arc::clone(&storage), &EngineConfig::default());
        let engine = CompletionEngine::new(
            Arc::clone(&storage),
            catalog.clone(),
            Arc::new(WriteLanes::new(true)),
        );
        (engine, catalog, storage, group.id)
    }

    #[tokio::test]
    async fn boolean_completion_ignores_quantity() {
        let (engine, catalog, storage, group) = setup().await;
        let task = catalog
            .create_task(group, TaskDraft::boolean("Dishes", 10).with_description("after dinner"))
            .await
            .unwrap();

        let outcome = engine.complete(UserId(1), task.id, Some(7)).await.unwrap();
        assert!(outcome.is_clean());
        let event = outcome.value;
        assert_eq!(event.amount, 10);
        assert_eq!(event.quantity, 1);
        assert_eq!(event.source_type, SourceType::Task);
        assert_eq!(event.source_id, Some(task.id.get()));
        assert_eq!(event.description, "Dishes");
        assert_eq!(event.notes, "after dinner");
        assert_eq!(storage.balance_of(UserId(1), group).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn integer_completion_requires_positive_quantity() {
        let (engine, catalog, storage, group) = setup().await;
        let task = catalog
            .create_task(group, TaskDraft::integer("Pages read", 2))
            .await
            .unwrap();

        for quantity in [None, Some(0), Some(-2)] {
            let err = engine.complete(UserId(1), task.id, quantity).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(storage.balance_of(UserId(1), group).await.unwrap(), 0);

        let event = engine
            .complete(UserId(1), task.id, Some(5))
            .await
            .unwrap()
            .into_value();
        assert_eq!((event.amount, event.quantity), (10, 5));
    }

    #[tokio::test]
    async fn outsiders_are_forbidden_and_missing_tasks_not_found() {
        let (engine, catalog, _storage, group) = setup().await;
        let task = catalog
            .create_task(group, TaskDraft::boolean("Walk", 3))
            .await
            .unwrap();

        let err = engine.complete(UserId(2), task.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = engine.complete(UserId(1), TaskId(404), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn one_time_task_is_consumed_and_restorable() {
        let (engine, catalog, _storage, group) = setup().await;
        let task = catalog
            .create_task(group, TaskDraft::boolean("Fix bike", 25).one_time())
            .await
            .unwrap();

        engine.complete(UserId(1), task.id, None).await.unwrap();
        let err = engine.complete(UserId(1), task.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let restored = catalog.restore_task(task.id).await.unwrap();
        assert_eq!(restored.id, task.id);
    }

    #[tokio::test]
    async fn one_time_task_that_cannot_be_removed_warns() {
        let storage = Arc::new(FaultyCatalogStorage::default());
        let group = storage
            .create_group("Home".into(), "c0ffee00c0ffee01".into())
            .await
            .unwrap();
        storage.add_member(group.id, UserId(1)).await.unwrap();
        let catalog = Catalog::new(storage.clone(), &EngineConfig::default());
        let engine = CompletionEngine::new(
            storage.clone(),
            catalog.clone(),
            Arc::new(WriteLanes::new(true)),
        );
        let task = catalog
            .create_task(group.id, TaskDraft::boolean("Clean garage", 40).one_time())
            .await
            .unwrap();

        storage.fail_deletes(true);
        let outcome = engine.complete(UserId(1), task.id, None).await.unwrap();
        assert_eq!(outcome.value.amount, 40);
        assert_eq!(storage.balance_of(UserId(1), group.id).await.unwrap(), 40);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            &outcome.warnings[0],
            SideEffectWarning::CatalogEntryNotRemoved { entry, .. }
                if *entry == CatalogEntryRef::Task(task.id)
        ));
        assert_eq!(catalog.get_task(task.id).await.unwrap(), task);
    }
}
