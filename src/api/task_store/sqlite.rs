//! SQLite-based task store.

use super::{Cursor, NewTask, StoreError, Task, TaskStatus, TaskStore};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const DB_FILE: &str = "tasks.db";

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'Not Started'
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_timestamp ON tasks(user_id, timestamp DESC, id DESC);
"#;

const SELECT_COLUMNS: &str = "SELECT id, user_id, text, timestamp, status FROM tasks";

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create task store dir: {}", e)))?;
        let db_path = base_dir.join(DB_FILE);

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(db_error)?;
            conn.execute_batch(SCHEMA).map_err(db_error)?;
            tracing::info!("Opened task database at {}", db_path.display());
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn).map_err(db_error)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }
}

/// Busy/locked databases are reported as transient.
fn db_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    let status = TaskStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown task status {:?}", status_str).into(),
        )
    })?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        timestamp: row.get(3)?,
        status,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn query_page(
        &self,
        user_id: &str,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Task>, StoreError> {
        let user_id = user_id.to_string();
        let after = after.map(|c| (c.timestamp().to_string(), c.id().to_string()));
        let limit = limit as i64;

        self.with_conn(move |conn| match after {
            Some((timestamp, id)) => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS}
                     WHERE user_id = ?1
                       AND (timestamp < ?2 OR (timestamp = ?2 AND id < ?3))
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?4"
                ))?;
                let rows = stmt.query_map(params![user_id, timestamp, id, limit], row_to_task)?;
                rows.collect::<Result<Vec<_>, _>>()
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS}
                     WHERE user_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![user_id, limit], row_to_task)?;
                rows.collect::<Result<Vec<_>, _>>()
            }
        })
        .await
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            text: task.text,
            timestamp: task.timestamp,
            status: task.status,
            user_id: task.user_id,
        };
        let row = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, user_id, text, timestamp, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row.id, row.user_id, row.text, row.timestamp, row.status.as_str()],
            )
        })
        .await?;
        Ok(task)
    }

    async fn get_task(&self, user_id: &str, id: &str) -> Result<Option<Task>, StoreError> {
        let user_id = user_id.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                row_to_task,
            )
            .optional()
        })
        .await
    }

    async fn update_status(
        &self,
        user_id: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        let id = id.to_string();
        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE tasks SET status = ?1 WHERE id = ?2 AND user_id = ?3",
                    params![status.as_str(), id, user_id],
                )
            })
            .await?;
        Ok(changed > 0)
    }

    async fn delete_task(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        let id = id.to_string();
        let deleted = self
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )
            })
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(user: &str, text: &str, nanos: u32) -> NewTask {
        NewTask {
            user_id: user.to_string(),
            text: text.to_string(),
            timestamp: format!("2026-10-18T09:00:00.{:09}Z", nanos),
            status: TaskStatus::NotStarted,
        }
    }

    #[tokio::test]
    async fn test_query_page_follows_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTaskStore::new(dir.path().to_path_buf()).await.unwrap();
        for i in 0..5 {
            store
                .insert_task(new_task("u", &format!("t{}", i), i))
                .await
                .unwrap();
        }
        store.insert_task(new_task("other", "x", 99)).await.unwrap();

        let first = store.query_page("u", 3, None).await.unwrap();
        let texts: Vec<_> = first.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["t4", "t3", "t2"]);

        let cursor = first.last().unwrap().cursor();
        let second = store.query_page("u", 3, Some(&cursor)).await.unwrap();
        let texts: Vec<_> = second.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["t1", "t0"]);
    }

    #[tokio::test]
    async fn test_status_patch_and_delete_are_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTaskStore::new(dir.path().to_path_buf()).await.unwrap();
        let task = store.insert_task(new_task("alice", "a", 1)).await.unwrap();

        assert!(!store
            .update_status("bob", &task.id, TaskStatus::Completed)
            .await
            .unwrap());
        assert!(store
            .update_status("alice", &task.id, TaskStatus::Completed)
            .await
            .unwrap());

        let stored = store.get_task("alice", &task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.text, task.text);
        assert_eq!(stored.timestamp, task.timestamp);

        assert!(!store.delete_task("bob", &task.id).await.unwrap());
        assert!(store.delete_task("alice", &task.id).await.unwrap());
        assert!(store.query_page("alice", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteTaskStore::new(dir.path().to_path_buf()).await.unwrap();
            store.insert_task(new_task("u", "persisted", 1)).await.unwrap();
        }
        let store = SqliteTaskStore::new(dir.path().to_path_buf()).await.unwrap();
        let page = store.query_page("u", 6, None).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].text, "persisted");
        assert_eq!(page[0].status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_unknown_status_is_reported_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTaskStore::new(dir.path().to_path_buf()).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO tasks (id, user_id, text, timestamp, status) \
                     VALUES ('bad', 'u', 'x', '2026-10-18T09:00:00.000000000Z', 'Archived')",
                    [],
                )
            })
            .await
            .unwrap();

        let err = store.get_task("u", "bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(store.query_page("u", 6, None).await.is_err());
    }
}
