//! SQLite adapter for Quest storage.
//!
//! This adapter is the durable source-of-truth backend. Ledger events are
//! protected by triggers that abort any UPDATE or DELETE on the
//! `transactions` table. Purchases take a `BEGIN IMMEDIATE` write lock so the
//! balance check and the debit see the same snapshot.

use crate::traits::{CatalogStore, GroupStore, LedgerStore, MembershipOracle, PurchaseStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_types::{
    CompletionPolicy, EventAppend, EventId, Group, GroupId, LedgerEvent, PolicyKind,
    PurchaseAppend, PurchaseHistoryRecord, PurchaseId, PurchaseRecord, ShopItem, ShopItemFields,
    ShopItemId, SourceType, Task, TaskCompletionRecord, TaskFields, TaskId, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const EVENT_COLUMNS: &str =
    "id, user_id, group_id, amount, source_type, source_id, quantity, description, notes, created_at";
const PURCHASE_COLUMNS: &str = "id, transaction_id, user_id, group_id, shop_item_id, fulfilled, \
     fulfilled_at, fulfilled_by, notes, cancelled_at, created_at";
const TASK_COLUMNS: &str = "id, group_id, title, description, task_type, reward_value, \
     default_quantity, is_one_time, due_at, created_at";
const SHOP_ITEM_COLUMNS: &str = "id, group_id, title, description, cost, is_one_time, created_at";

/// SQLite-backed storage adapter.
#[derive(Clone)]
pub struct SqliteQuestStorage {
    pool: SqlitePool,
}

impl SqliteQuestStorage {
    /// Connect to SQLite and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 5, 5).await
    }

    /// Connect with explicit pool parameters.
    ///
    /// In-memory databases are private to one connection, so their pool is
    /// capped at a single connection.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::InvalidInput(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(connect_timeout_secs));
        let mut pool_options =
            SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(connect_timeout_secs));
        pool_options = if database_url.contains(":memory:") {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect sqlite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS quest_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                invite_code TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL REFERENCES quest_groups(id),
                user_id INTEGER NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                task_type TEXT NOT NULL CHECK (task_type IN ('boolean', 'integer')),
                reward_value INTEGER NOT NULL CHECK (reward_value > 0),
                default_quantity INTEGER,
                is_one_time INTEGER NOT NULL DEFAULT 0,
                due_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS shop_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cost INTEGER NOT NULL CHECK (cost > 0),
                is_one_time INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                source_type TEXT NOT NULL CHECK (source_type IN ('task', 'shop_item', 'manual')),
                source_id INTEGER,
                quantity INTEGER NOT NULL DEFAULT 1,
                description TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transactions_user_group ON transactions (user_id, group_id)",
            r#"
            CREATE TRIGGER IF NOT EXISTS transactions_no_update
            BEFORE UPDATE ON transactions
            BEGIN
                SELECT RAISE(ABORT, 'ledger events are immutable');
            END
            "#,
            r#"
            CREATE TRIGGER IF NOT EXISTS transactions_no_delete
            BEFORE DELETE ON transactions
            BEGIN
                SELECT RAISE(ABORT, 'ledger events are immutable');
            END
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS purchases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER NOT NULL UNIQUE REFERENCES transactions(id),
                user_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                shop_item_id INTEGER NOT NULL,
                fulfilled INTEGER NOT NULL DEFAULT 0,
                fulfilled_at TEXT,
                fulfilled_by INTEGER,
                notes TEXT NOT NULL DEFAULT '',
                cancelled_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_purchases_group ON purchases (group_id)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn insert_event(
        conn: &mut SqliteConnection,
        event: EventAppend,
        at: DateTime<Utc>,
    ) -> StorageResult<LedgerEvent> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (user_id, group_id, amount, source_type, source_id, quantity, description, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.actor.get())
        .bind(event.group_id.get())
        .bind(event.amount)
        .bind(event.source_type.as_str())
        .bind(event.source_id)
        .bind(event.quantity)
        .bind(&event.description)
        .bind(&event.notes)
        .bind(at)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(event.into_event(EventId(result.last_insert_rowid()), at))
    }

    async fn balance_in(
        conn: &mut SqliteConnection,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = ? AND group_id = ?",
        )
        .bind(actor.get())
        .bind(group_id.get())
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)
    }

    async fn purchase_in_tx(
        conn: &mut SqliteConnection,
        purchase: PurchaseAppend,
    ) -> StorageResult<(LedgerEvent, PurchaseRecord)> {
        let have = Self::balance_in(conn, purchase.actor, purchase.group_id).await?;

        if have < purchase.cost {
            return Err(StorageError::InsufficientBalance {
                have,
                need: purchase.cost,
            });
        }

        let now = Utc::now();
        let event = Self::insert_event(
            conn,
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
        )
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO purchases
                (transaction_id, user_id, group_id, shop_item_id, fulfilled, notes, created_at)
            VALUES (?, ?, ?, ?, 0, '', ?)
            "#,
        )
        .bind(event.id.get())
        .bind(purchase.actor.get())
        .bind(purchase.group_id.get())
        .bind(purchase.shop_item_id.get())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let record = PurchaseRecord {
            id: PurchaseId(result.last_insert_rowid()),
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
        Ok((event, record))
    }

    async fn fetch_purchases(
        &self,
        filter: &str,
        binds: &[i64],
    ) -> StorageResult<Vec<PurchaseRecord>> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE {filter} ORDER BY id DESC");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_purchase).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteQuestStorage {
    async fn append_event(&self, event: EventAppend) -> StorageResult<LedgerEvent> {
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StorageError::Backend(format!("failed to begin append: {e}")))?;

        Self::balance_in(&mut tx, event.actor, event.group_id)
            .await?
            .checked_add(event.amount)
            .ok_or_else(|| StorageError::InvalidInput("balance overflows i64".to_string()))?;
        let written = Self::insert_event(&mut tx, event, Utc::now()).await?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to commit append: {e}")))?;
        Ok(written)
    }

    async fn get_event(&self, event_id: EventId) -> StorageResult<Option<LedgerEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(event_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn balance_of(&self, actor: UserId, group_id: GroupId) -> StorageResult<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = ? AND group_id = ?",
        )
        .bind(actor.get())
        .bind(group_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn history_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<LedgerEvent>> {
        // Ids are assigned in commit order, so id order is creation order.
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM transactions WHERE user_id = ? AND group_id = ? ORDER BY id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(actor.get())
            .bind(group_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn task_completion_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<TaskCompletionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT tx.id AS id, tx.user_id AS user_id, tx.group_id AS group_id,
                   tx.amount AS amount, tx.source_type AS source_type,
                   tx.source_id AS source_id, tx.quantity AS quantity,
                   tx.description AS description, tx.notes AS notes,
                   tx.created_at AS created_at,
                   t.id AS task_id, t.group_id AS task_group_id, t.title AS task_title,
                   t.description AS task_description, t.task_type AS task_task_type,
                   t.reward_value AS task_reward_value,
                   t.default_quantity AS task_default_quantity,
                   t.is_one_time AS task_is_one_time, t.due_at AS task_due_at,
                   t.created_at AS task_created_at
              FROM transactions tx
              LEFT JOIN tasks t ON t.id = tx.source_id
             WHERE tx.user_id = ? AND tx.group_id = ? AND tx.source_type = 'task'
             ORDER BY tx.id DESC
            "#,
        )
        .bind(actor.get())
        .bind(group_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let event = row_to_event(row)?;
                let task = match get::<Option<i64>>(row, "task_id")? {
                    Some(_) => Some(row_to_task_prefixed(row, "task_")?),
                    None => None,
                };
                Ok(TaskCompletionRecord::new(event, task))
            })
            .collect()
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

        // Dropping `tx` before commit rolls back, including when the caller
        // cancels this future.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StorageError::Backend(format!("failed to begin purchase: {e}")))?;

        let written = Self::purchase_in_tx(&mut tx, purchase).await?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to commit purchase: {e}")))?;
        debug!(event_id = %written.0.id, "purchase committed");
        Ok(written)
    }
}

#[async_trait]
impl PurchaseStore for SqliteQuestStorage {
    async fn get_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        Ok(self
            .fetch_purchases("id = ?", &[purchase_id.get()])
            .await?
            .into_iter()
            .next())
    }

    async fn purchase_for_event(
        &self,
        event_id: EventId,
    ) -> StorageResult<Option<PurchaseRecord>> {
        Ok(self
            .fetch_purchases("transaction_id = ?", &[event_id.get()])
            .await?
            .into_iter()
            .next())
    }

    async fn mark_fulfilled(
        &self,
        purchase_id: PurchaseId,
        fulfilled_by: UserId,
        notes: String,
        at: DateTime<Utc>,
    ) -> StorageResult<PurchaseRecord> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
               SET fulfilled = 1, fulfilled_at = ?, fulfilled_by = ?, notes = ?
             WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(fulfilled_by.get())
        .bind(&notes)
        .bind(purchase_id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "purchase {purchase_id} not found"
            )));
        }
        self.get_purchase(purchase_id).await?.ok_or_else(|| {
            StorageError::NotFound(format!("purchase {purchase_id} not found"))
        })
    }

    async fn cancel_by_event(
        &self,
        event_id: EventId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<PurchaseRecord>> {
        let result = sqlx::query(
            "UPDATE purchases SET cancelled_at = ? WHERE transaction_id = ? AND cancelled_at IS NULL",
        )
        .bind(at)
        .bind(event_id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.purchase_for_event(event_id).await
    }

    async fn purchases_of(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseRecord>> {
        self.fetch_purchases("user_id = ? AND group_id = ?", &[actor.get(), group_id.get()])
            .await
    }

    async fn purchases_in_group(&self, group_id: GroupId) -> StorageResult<Vec<PurchaseRecord>> {
        self.fetch_purchases("group_id = ?", &[group_id.get()]).await
    }

    async fn purchase_history(
        &self,
        actor: UserId,
        group_id: GroupId,
    ) -> StorageResult<Vec<PurchaseHistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS id, p.transaction_id AS transaction_id, p.user_id AS user_id,
                   p.group_id AS group_id, p.shop_item_id AS shop_item_id,
                   p.fulfilled AS fulfilled, p.fulfilled_at AS fulfilled_at,
                   p.fulfilled_by AS fulfilled_by, p.notes AS notes,
                   p.cancelled_at AS cancelled_at, p.created_at AS created_at,
                   COALESCE(tx.description, '') AS event_description,
                   COALESCE(tx.notes, '') AS event_notes,
                   s.id AS item_id, s.group_id AS item_group_id, s.title AS item_title,
                   s.description AS item_description, s.cost AS item_cost,
                   s.is_one_time AS item_is_one_time, s.created_at AS item_created_at
              FROM purchases p
              LEFT JOIN transactions tx ON tx.id = p.transaction_id
              LEFT JOIN shop_items s ON s.id = p.shop_item_id
             WHERE p.user_id = ? AND p.group_id = ?
             ORDER BY p.id DESC
            "#,
        )
        .bind(actor.get())
        .bind(group_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let purchase = row_to_purchase(row)?;
                let description: String = get(row, "event_description")?;
                let notes: String = get(row, "event_notes")?;
                let item = match get::<Option<i64>>(row, "item_id")? {
                    Some(_) => Some(row_to_shop_item_prefixed(row, "item_")?),
                    None => None,
                };
                Ok(PurchaseHistoryRecord::new(purchase, &description, &notes, item))
            })
            .collect()
    }
}

#[async_trait]
impl CatalogStore for SqliteQuestStorage {
    async fn insert_task(&self, group_id: GroupId, fields: TaskFields) -> StorageResult<Task> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks
                (group_id, title, description, task_type, reward_value, default_quantity, is_one_time, due_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id.get())
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.policy.kind().as_str())
        .bind(fields.reward_value)
        .bind(fields.policy.default_quantity())
        .bind(fields.is_one_time)
        .bind(fields.due_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Task::from_fields(
            TaskId(result.last_insert_rowid()),
            group_id,
            fields,
            now,
        ))
    }

    async fn get_task(&self, task_id: TaskId) -> StorageResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(task_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref()
            .map(|row| row_to_task_prefixed(row, ""))
            .transpose()
    }

    async fn list_tasks(&self, group_id: GroupId) -> StorageResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE group_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(group_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(|row| row_to_task_prefixed(row, "")).collect()
    }

    async fn update_task(&self, task_id: TaskId, fields: TaskFields) -> StorageResult<Task> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
               SET title = ?, description = ?, task_type = ?, reward_value = ?,
                   default_quantity = ?, is_one_time = ?, due_at = ?
             WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.policy.kind().as_str())
        .bind(fields.reward_value)
        .bind(fields.policy.default_quantity())
        .bind(fields.is_one_time)
        .bind(fields.due_at)
        .bind(task_id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("task {task_id} not found")));
        }
        self.get_task(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))
    }

    async fn delete_task(&self, task_id: TaskId) -> StorageResult<Task> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.get())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("task {task_id} not found")));
        }
        Ok(task)
    }

    async fn restore_task(&self, task: Task) -> StorageResult<Task> {
        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, group_id, title, description, task_type, reward_value, default_quantity, is_one_time, due_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.get())
        .bind(task.group_id.get())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.policy.kind().as_str())
        .bind(task.reward_value)
        .bind(task.policy.default_quantity())
        .bind(task.is_one_time)
        .bind(task.due_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(task)
    }

    async fn insert_shop_item(
        &self,
        group_id: GroupId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO shop_items (group_id, title, description, cost, is_one_time, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id.get())
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.cost)
        .bind(fields.is_one_time)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ShopItem::from_fields(
            ShopItemId(result.last_insert_rowid()),
            group_id,
            fields,
            now,
        ))
    }

    async fn get_shop_item(&self, item_id: ShopItemId) -> StorageResult<Option<ShopItem>> {
        let sql = format!("SELECT {SHOP_ITEM_COLUMNS} FROM shop_items WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(item_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref()
            .map(|row| row_to_shop_item_prefixed(row, ""))
            .transpose()
    }

    async fn list_shop_items(&self, group_id: GroupId) -> StorageResult<Vec<ShopItem>> {
        let sql =
            format!("SELECT {SHOP_ITEM_COLUMNS} FROM shop_items WHERE group_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(group_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| row_to_shop_item_prefixed(row, ""))
            .collect()
    }

    async fn update_shop_item(
        &self,
        item_id: ShopItemId,
        fields: ShopItemFields,
    ) -> StorageResult<ShopItem> {
        let result = sqlx::query(
            "UPDATE shop_items SET title = ?, description = ?, cost = ?, is_one_time = ? WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.cost)
        .bind(fields.is_one_time)
        .bind(item_id.get())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "shop item {item_id} not found"
            )));
        }
        self.get_shop_item(item_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("shop item {item_id} not found")))
    }

    async fn delete_shop_item(&self, item_id: ShopItemId) -> StorageResult<ShopItem> {
        let item = self
            .get_shop_item(item_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("shop item {item_id} not found")))?;
        let result = sqlx::query("DELETE FROM shop_items WHERE id = ?")
            .bind(item_id.get())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "shop item {item_id} not found"
            )));
        }
        Ok(item)
    }

    async fn restore_shop_item(&self, item: ShopItem) -> StorageResult<ShopItem> {
        sqlx::query(
            r#"
            INSERT INTO shop_items (id, group_id, title, description, cost, is_one_time, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.get())
        .bind(item.group_id.get())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.cost)
        .bind(item.is_one_time)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(item)
    }
}

#[async_trait]
impl MembershipOracle for SqliteQuestStorage {
    async fn is_member(&self, user: UserId, group_id: GroupId) -> StorageResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id.get())
        .bind(user.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl GroupStore for SqliteQuestStorage {
    async fn create_group(&self, name: String, invite_code: String) -> StorageResult<Group> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO quest_groups (name, invite_code, created_at) VALUES (?, ?, ?)")
            .bind(&name)
            .bind(&invite_code)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Group {
            id: GroupId(result.last_insert_rowid()),
            name,
            invite_code,
            created_at: now,
        })
    }

    async fn get_group(&self, group_id: GroupId) -> StorageResult<Option<Group>> {
        let row = sqlx::query("SELECT id, name, invite_code, created_at FROM quest_groups WHERE id = ?")
            .bind(group_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn group_by_invite_code(&self, invite_code: &str) -> StorageResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, invite_code, created_at FROM quest_groups WHERE invite_code = ?",
        )
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn add_member(&self, group_id: GroupId, user: UserId) -> StorageResult<()> {
        if self.get_group(group_id).await?.is_none() {
            return Err(StorageError::NotFound(format!("group {group_id} not found")));
        }
        sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(group_id.get())
            .bind(user.get())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn groups_of(&self, user: UserId) -> StorageResult<Vec<Group>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id AS id, g.name AS name, g.invite_code AS invite_code,
                   g.created_at AS created_at
              FROM quest_groups g
              JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?
             ORDER BY g.id ASC
            "#,
        )
        .bind(user.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_group).collect()
    }

    async fn members_of(&self, group_id: GroupId) -> StorageResult<Vec<UserId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id ASC",
        )
        .bind(group_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Serialization(format!("column {column}: {e}")))
}

fn row_to_event(row: &SqliteRow) -> StorageResult<LedgerEvent> {
    let source_type: String = get(row, "source_type")?;
    Ok(LedgerEvent {
        id: EventId(get(row, "id")?),
        actor: UserId(get(row, "user_id")?),
        group_id: GroupId(get(row, "group_id")?),
        amount: get(row, "amount")?,
        source_type: SourceType::from_str(&source_type)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        source_id: get(row, "source_id")?,
        quantity: get(row, "quantity")?,
        description: get(row, "description")?,
        notes: get(row, "notes")?,
        created_at: get(row, "created_at")?,
    })
}

fn row_to_purchase(row: &SqliteRow) -> StorageResult<PurchaseRecord> {
    Ok(PurchaseRecord {
        id: PurchaseId(get(row, "id")?),
        event_id: EventId(get(row, "transaction_id")?),
        actor: UserId(get(row, "user_id")?),
        group_id: GroupId(get(row, "group_id")?),
        shop_item_id: ShopItemId(get(row, "shop_item_id")?),
        fulfilled: get(row, "fulfilled")?,
        fulfilled_at: get(row, "fulfilled_at")?,
        fulfilled_by: get::<Option<i64>>(row, "fulfilled_by")?.map(UserId),
        notes: get(row, "notes")?,
        cancelled_at: get(row, "cancelled_at")?,
        created_at: get(row, "created_at")?,
    })
}

fn row_to_task_prefixed(row: &SqliteRow, prefix: &str) -> StorageResult<Task> {
    let col = |name: &str| format!("{prefix}{name}");
    let kind: String = get(row, &col("task_type"))?;
    let kind =
        PolicyKind::from_str(&kind).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let policy = match kind {
        PolicyKind::Boolean => CompletionPolicy::Boolean,
        PolicyKind::Integer => {
            let default_quantity: Option<i64> = get(row, &col("default_quantity"))?;
            CompletionPolicy::Integer {
                default_quantity: default_quantity.ok_or_else(|| {
                    StorageError::Serialization(
                        "integer task stored without default_quantity".to_string(),
                    )
                })?,
            }
        }
    };
    Ok(Task {
        id: TaskId(get(row, &col("id"))?),
        group_id: GroupId(get(row, &col("group_id"))?),
        title: get(row, &col("title"))?,
        description: get(row, &col("description"))?,
        policy,
        reward_value: get(row, &col("reward_value"))?,
        is_one_time: get(row, &col("is_one_time"))?,
        due_at: get(row, &col("due_at"))?,
        created_at: get(row, &col("created_at"))?,
    })
}

fn row_to_shop_item_prefixed(row: &SqliteRow, prefix: &str) -> StorageResult<ShopItem> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(ShopItem {
        id: ShopItemId(get(row, &col("id"))?),
        group_id: GroupId(get(row, &col("group_id"))?),
        title: get(row, &col("title"))?,
        description: get(row, &col("description"))?,
        cost: get(row, &col("cost"))?,
        is_one_time: get(row, &col("is_one_time"))?,
        created_at: get(row, &col("created_at"))?,
    })
}

fn row_to_group(row: &SqliteRow) -> StorageResult<Group> {
    Ok(Group {
        id: GroupId(get(row, "id")?),
        name: get(row, "name")?,
        invite_code: get(row, "invite_code")?,
        created_at: get(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> SqliteQuestStorage {
        SqliteQuestStorage::connect("sqlite::memory:").await.unwrap()
    }

    fn integer_task(title: &str) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            description: "per page".to_string(),
            policy: CompletionPolicy::Integer {
                default_quantity: 10,
            },
            reward_value: 2,
            is_one_time: false,
            due_at: None,
        }
    }

    #[tokio::test]
    async fn events_round_trip_and_fold_into_balance() {
        let storage = storage().await;
        let first = storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), 12, "bonus"))
            .await
            .unwrap();
        let second = storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), -5, "fine"))
            .await
            .unwrap();

        assert_eq!(storage.get_event(first.id).await.unwrap(), Some(first.clone()));
        assert_eq!(storage.balance_of(UserId(1), GroupId(1)).await.unwrap(), 7);
        assert_eq!(storage.balance_of(UserId(2), GroupId(1)).await.unwrap(), 0);

        let history = storage.history_of(UserId(1), GroupId(1)).await.unwrap();
        assert_eq!(history, vec![second, first]);
    }

    #[tokio::test]
    async fn append_that_overflows_the_balance_is_rejected() {
        let storage = storage().await;
        storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), i64::MIN, "floor"))
            .await
            .unwrap();

        let err = storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), -1, "under"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(
            storage.balance_of(UserId(1), GroupId(1)).await.unwrap(),
            i64::MIN
        );
    }

    #[tokio::test]
    async fn events_are_immutable_at_the_table_level() {
        let storage = storage().await;
        let event = storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), 3, "bonus"))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE transactions SET amount = 100 WHERE id = ?")
            .bind(event.id.get())
            .execute(storage.pool())
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(event.id.get())
            .execute(storage.pool())
            .await;
        assert!(delete.is_err());
        assert_eq!(storage.balance_of(UserId(1), GroupId(1)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn purchase_is_all_or_nothing() {
        let storage = storage().await;
        storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), 10, "seed"))
            .await
            .unwrap();
        let append = PurchaseAppend {
            actor: UserId(1),
            group_id: GroupId(1),
            shop_item_id: ShopItemId(4),
            cost: 15,
            description: "Pizza".into(),
            notes: String::new(),
        };

        let err = storage.append_purchase(append.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::InsufficientBalance { have: 10, need: 15 }
        ));
        assert!(storage
            .purchases_of(UserId(1), GroupId(1))
            .await
            .unwrap()
            .is_empty());

        let (event, purchase) = storage
            .append_purchase(PurchaseAppend { cost: 10, ..append })
            .await
            .unwrap();
        assert_eq!(event.amount, -10);
        assert_eq!(purchase.event_id, event.id);
        assert_eq!(storage.balance_of(UserId(1), GroupId(1)).await.unwrap(), 0);
        assert_eq!(
            storage.purchase_for_event(event.id).await.unwrap(),
            Some(purchase)
        );
    }

    #[tokio::test]
    async fn cancelled_purchase_leaves_no_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quest.db").display());
        let storage = SqliteQuestStorage::connect_with_options(&url, 1, 5)
            .await
            .unwrap();
        storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), 1_000, "seed"))
            .await
            .unwrap();
        let append = PurchaseAppend {
            actor: UserId(1),
            group_id: GroupId(1),
            shop_item_id: ShopItemId(1),
            cost: 1,
            description: "Sticker".into(),
            notes: String::new(),
        };

        for step in 1..=40u64 {
            let _ = tokio::time::timeout(
                Duration::from_micros(5 * step),
                storage.append_purchase(append.clone()),
            )
            .await;

            // A leaked BEGIN on the single pooled connection would make this fail.
            let tx = storage.pool().begin().await.unwrap();
            tx.rollback().await.unwrap();
        }

        let (event, _) = storage.append_purchase(append).await.unwrap();
        let purchases = storage.purchases_of(UserId(1), GroupId(1)).await.unwrap();
        assert_eq!(purchases[0].event_id, event.id);
        let history = storage.history_of(UserId(1), GroupId(1)).await.unwrap();
        assert_eq!(history.len(), purchases.len() + 1);
        assert_eq!(
            storage.balance_of(UserId(1), GroupId(1)).await.unwrap(),
            1_000 - purchases.len() as i64
        );
    }

    #[tokio::test]
    async fn fulfil_then_cancel_keeps_fulfilled_flag() {
        let storage = storage().await;
        storage
            .append_event(EventAppend::manual(UserId(1), GroupId(1), 10, "seed"))
            .await
            .unwrap();
        let (event, purchase) = storage
            .append_purchase(PurchaseAppend {
                actor: UserId(1),
                group_id: GroupId(1),
                shop_item_id: ShopItemId(1),
                cost: 5,
                description: "Sticker".into(),
                notes: String::new(),
            })
            .await
            .unwrap();

        let fulfilled = storage
            .mark_fulfilled(purchase.id, UserId(2), "handed over".into(), Utc::now())
            .await
            .unwrap();
        assert!(fulfilled.fulfilled);
        assert_eq!(fulfilled.fulfilled_by, Some(UserId(2)));

        let cancelled = storage
            .cancel_by_event(event.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(cancelled.is_cancelled());
        assert!(cancelled.fulfilled);
        assert!(storage
            .cancel_by_event(event.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn catalog_round_trip_with_restore() {
        let storage = storage().await;
        let task = storage.insert_task(GroupId(1), integer_task("Read")).await.unwrap();
        assert_eq!(storage.get_task(task.id).await.unwrap(), Some(task.clone()));

        let removed = storage.delete_task(task.id).await.unwrap();
        assert!(storage.get_task(task.id).await.unwrap().is_none());
        let restored = storage.restore_task(removed.clone()).await.unwrap();
        assert_eq!(restored.id, task.id);
        assert!(matches!(
            storage.restore_task(removed).await,
            Err(StorageError::Conflict(_))
        ));
        assert_eq!(storage.list_tasks(GroupId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_history_keeps_snapshot_after_task_deletion() {
        let storage = storage().await;
        let task = storage.insert_task(GroupId(1), integer_task("Read")).await.unwrap();
        let award = task.policy.award(task.reward_value, Some(3)).unwrap();
        storage
            .append_event(EventAppend::task_completion(UserId(1), &task, award))
            .await
            .unwrap();
        storage.delete_task(task.id).await.unwrap();

        let history = storage
            .task_completion_history(UserId(1), GroupId(1))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Read");
        assert_eq!(history[0].description, "per page");
        assert!(history[0].task.is_none());
        assert_eq!(history[0].event.amount, 6);
    }

    #[tokio::test]
    async fn groups_and_membership() {
        let storage = storage().await;
        let group = storage
            .create_group("Family".into(), "00ff00ff00ff00ff".into())
            .await
            .unwrap();
        storage.add_member(group.id, UserId(5)).await.unwrap();

        assert!(storage.is_member(UserId(5), group.id).await.unwrap());
        assert!(!storage.is_member(UserId(6), group.id).await.unwrap());
        assert!(matches!(
            storage.add_member(group.id, UserId(5)).await,
            Err(StorageError::Conflict(_))
        ));
        assert_eq!(
            storage
                .group_by_invite_code("00ff00ff00ff00ff")
                .await
                .unwrap()
                .map(|g| g.id),
            Some(group.id)
        );
        assert_eq!(storage.members_of(group.id).await.unwrap(), vec![UserId(5)]);
    }
}
