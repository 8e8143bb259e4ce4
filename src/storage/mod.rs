use anyhow::{Context as _, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Queries slower than this are logged at WARN level.
const SLOW_QUERY_MS: u64 = 1000;

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Current UTC time as an RFC 3339 string.
///
/// Fixed microsecond precision so the TEXT column sorts chronologically.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    /// One of "low" | "medium" | "high" — enforced at the service layer.
    pub priority: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Column updates for a task. `None` leaves the stored value unchanged.
#[derive(Debug, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("taskd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true)
                .log_slow_statements(
                    log::LevelFilter::Warn,
                    std::time::Duration::from_millis(SLOW_QUERY_MS),
                );

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 title       TEXT    NOT NULL,
                 description TEXT    NOT NULL DEFAULT '',
                 completed   INTEGER NOT NULL DEFAULT 0,
                 priority    TEXT    NOT NULL DEFAULT 'medium',
                 created_at  TEXT    NOT NULL,
                 updated_at  TEXT    NOT NULL
             )",
        )
        .execute(pool)
        .await
        .context("failed to create tasks table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_completed ON tasks(completed)")
            .execute(pool)
            .await?;

        Ok(())
    }

    // ─── Tasks ───────────────────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        completed: bool,
        priority: &str,
    ) -> Result<TaskRow> {
        let now = now_rfc3339();
        let pool = self.pool.clone();
        let id = with_timeout(async {
            let result = sqlx::query(
                "INSERT INTO tasks (title, description, completed, priority, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(title)
            .bind(description)
            .bind(completed)
            .bind(priority)
            .bind(&now)
            .bind(&now)
            .execute(&pool)
            .await?;
            Ok(result.last_insert_rowid())
        })
        .await?;

        self.get_task(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task not found after insert"))
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// List tasks ordered by `order_by` (a whitelisted ORDER BY clause built
    /// by the service layer — never raw client input).
    ///
    /// `search` is applied as a post-filter; SQLite LIKE would need wildcard
    /// escaping for no real gain at this scale.
    pub async fn list_tasks(&self, order_by: &str, search: Option<&str>) -> Result<Vec<TaskRow>> {
        let sql = format!("SELECT * FROM tasks ORDER BY {order_by}");
        let pool = self.pool.clone();
        let mut rows: Vec<TaskRow> =
            with_timeout(async { Ok(sqlx::query_as(&sql).fetch_all(&pool).await?) }).await?;

        if let Some(q) = search {
            let q = q.to_lowercase();
            rows.retain(|r| {
                r.title.to_lowercase().contains(&q) || r.description.to_lowercase().contains(&q)
            });
        }

        Ok(rows)
    }

    /// List tasks by completion flag, newest first.
    pub async fn list_by_completed(&self, completed: bool) -> Result<Vec<TaskRow>> {
        let pool = self.pool.clone();
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM tasks WHERE completed = ? ORDER BY created_at DESC, id DESC",
            )
            .bind(completed)
            .fetch_all(&pool)
            .await?)
        })
        .await
    }

    /// Apply `changes` to a task. Returns `None` if the id does not exist.
    ///
    /// Read-modify-write inside one transaction so concurrent updates never
    /// produce a partially-applied row.
    pub async fn update_task(&self, id: i64, changes: TaskChanges) -> Result<Option<TaskRow>> {
        let pool = self.pool.clone();
        with_timeout(async {
            let mut tx = pool.begin().await?;

            let current: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            let Some(current) = current else {
                return Ok(None);
            };

            let title = changes.title.unwrap_or(current.title);
            let description = changes.description.unwrap_or(current.description);
            let completed = changes.completed.unwrap_or(current.completed);
            let priority = changes.priority.unwrap_or(current.priority);
            let now = now_rfc3339();

            sqlx::query(
                "UPDATE tasks SET title = ?, description = ?, completed = ?, priority = ?,
                 updated_at = ? WHERE id = ?",
            )
            .bind(&title)
            .bind(&description)
            .bind(completed)
            .bind(&priority)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            let updated: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(updated))
        })
        .await
    }

    /// Delete a task. Returns false if the id does not exist.
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let pool = self.pool.clone();
        with_timeout(async {
            let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(id)
                .execute(&pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Flip the completion flag. Returns `None` if the id does not exist.
    ///
    /// The flip and the read-back share one transaction — a concurrent delete
    /// can never turn a successful flip into a missing row.
    pub async fn toggle_complete(&self, id: i64) -> Result<Option<TaskRow>> {
        let now = now_rfc3339();
        let pool = self.pool.clone();
        with_timeout(async {
            let mut tx = pool.begin().await?;

            let result =
                sqlx::query("UPDATE tasks SET completed = NOT completed, updated_at = ? WHERE id = ?")
                    .bind(&now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() == 0 {
                return Ok(None);
            }

            let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(row))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn make_storage(dir: &TempDir) -> Storage {
        Storage::new(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn create_applies_defaults_and_timestamps() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let task = storage
            .create_task("Default Task", "", false, "medium")
            .await
            .unwrap();
        assert_eq!(task.title, "Default Task");
        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert_eq!(task.priority, "medium");
        assert!(task.created_at <= task.updated_at);
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let first = storage.create_task("First Task", "", false, "medium").await.unwrap();
        let second = storage.create_task("Second Task", "", false, "medium").await.unwrap();

        let rows = storage
            .list_tasks("created_at DESC, id DESC", None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second.id);
        assert_eq!(rows[1].id, first.id);
    }

    #[tokio::test]
    async fn search_matches_title_or_description_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        storage.create_task("Buy milk", "", false, "low").await.unwrap();
        storage
            .create_task("Errands", "pick up MILK and eggs", false, "low")
            .await
            .unwrap();
        storage.create_task("Write report", "", false, "high").await.unwrap();

        let rows = storage
            .list_tasks("created_at DESC, id DESC", Some("milk"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn update_preserves_created_at_and_bumps_updated_at() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let task = storage
            .create_task("Original Title", "", false, "medium")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = storage
            .update_task(
                task.id,
                TaskChanges {
                    title: Some("Updated Title".to_string()),
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Updated Title");
        assert!(updated.completed);
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at > task.updated_at);
    }

    #[tokio::test]
    async fn update_missing_id_returns_none() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let result = storage.update_task(999, TaskChanges::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let task = storage.create_task("To Delete", "", false, "medium").await.unwrap();
        assert!(storage.delete_task(task.id).await.unwrap());
        assert!(storage.get_task(task.id).await.unwrap().is_none());
        assert!(!storage.delete_task(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn toggle_is_involutive() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let task = storage.create_task("Toggle Task", "", false, "medium").await.unwrap();
        let once = storage.toggle_complete(task.id).await.unwrap().unwrap();
        assert!(once.completed);
        let twice = storage.toggle_complete(task.id).await.unwrap().unwrap();
        assert!(!twice.completed);
        assert!(storage.toggle_complete(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn toggle_returns_the_flipped_row_with_bumped_updated_at() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        let task = storage.create_task("Flip Me", "", false, "medium").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let flipped = storage.toggle_complete(task.id).await.unwrap().unwrap();
        assert!(flipped.completed);
        assert_eq!(flipped.id, task.id);
        assert_eq!(flipped.created_at, task.created_at);
        assert!(flipped.updated_at > task.updated_at);
    }

    #[tokio::test]
    async fn list_by_completed_splits_tasks() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir).await;

        storage.create_task("Completed Task", "", true, "medium").await.unwrap();
        storage.create_task("Pending Task", "", false, "medium").await.unwrap();

        let done = storage.list_by_completed(true).await.unwrap();
        let pending = storage.list_by_completed(false).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].title, "Completed Task");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Pending Task");
    }
}
