//! Task storage module with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `file`: JSON snapshot file
//! - `sqlite`: SQLite database (default)
//!
//! Every backend exposes the same four document-store operation shapes on the
//! `tasks` collection: a user-filtered page read ordered by `timestamp`
//! descending and resumable from a [`Cursor`], insert, status patch, and delete.

mod file;
mod memory;
mod sqlite;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single to-do item owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    /// Creation time, RFC 3339 with fixed nanosecond precision.
    pub timestamp: String,
    pub status: TaskStatus,
    pub user_id: String,
}

impl Task {
    /// Position of this task in the `timestamp DESC, id DESC` ordering.
    fn order_key(&self) -> (&str, &str) {
        (&self.timestamp, &self.id)
    }

    /// Cursor pointing at this task.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            timestamp: self.timestamp.clone(),
            id: self.id.clone(),
        }
    }
}

/// Fields supplied on insert. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: String,
    pub text: String,
    pub timestamp: String,
    pub status: TaskStatus,
}

/// Task workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    Ongoing,
    Completed,
}

/// Allowed status transitions as `(from, to)` pairs.
///
/// Every state may move to every other state, including back to `NotStarted`.
const ALLOWED_TRANSITIONS: &[(TaskStatus, TaskStatus)] = &[
    (TaskStatus::NotStarted, TaskStatus::Ongoing),
    (TaskStatus::NotStarted, TaskStatus::Completed),
    (TaskStatus::Ongoing, TaskStatus::NotStarted),
    (TaskStatus::Ongoing, TaskStatus::Completed),
    (TaskStatus::Completed, TaskStatus::NotStarted),
    (TaskStatus::Completed, TaskStatus::Ongoing),
];

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::NotStarted,
        TaskStatus::Ongoing,
        TaskStatus::Completed,
    ];

    /// Display/wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::Ongoing => "Ongoing",
            TaskStatus::Completed => "Completed",
        }
    }

    /// Parse the display form, also accepting snake/camel spellings.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "notstarted" => Some(TaskStatus::NotStarted),
            "ongoing" => Some(TaskStatus::Ongoing),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Whether a task in this status may be moved to `next`.
    ///
    /// Setting the same status again is always allowed (a no-op patch).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self == next || ALLOWED_TRANSITIONS.contains(&(self, next))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque pagination token identifying the last item of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "t")]
    timestamp: String,
    #[serde(rename = "i")]
    id: String,
}

impl Cursor {
    /// Encode as a URL-safe token.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| StoreError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::InvalidCursor)
    }

    /// Whether `task` sorts strictly after this cursor in `timestamp DESC, id DESC` order.
    pub fn precedes(&self, task: &Task) -> bool {
        (self.timestamp.as_str(), self.id.as_str()).cmp(&task.order_key()) == Ordering::Greater
    }

    pub(crate) fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }
}

/// Errors raised by task store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is temporarily unable to serve the request (busy/locked).
    #[error("Task store unavailable: {0}")]
    Unavailable(String),

    #[error("Task store database error: {0}")]
    Database(String),

    #[error("Task store I/O error: {0}")]
    Io(String),

    #[error("Task store serialization error: {0}")]
    Serialization(String),

    #[error("Invalid pagination cursor")]
    InvalidCursor,
}

impl StoreError {
    /// Check if this error is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Sort tasks newest first (`timestamp DESC, id DESC`).
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
}

/// Select one page out of an unordered set of a user's tasks.
///
/// Shared by the backends that hold documents in memory.
pub(crate) fn select_page<'a, I>(
    tasks: I,
    user_id: &str,
    limit: usize,
    after: Option<&Cursor>,
) -> Vec<Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut matching: Vec<Task> = tasks
        .into_iter()
        .filter(|t| t.user_id == user_id)
        .filter(|t| after.map_or(true, |c| c.precedes(t)))
        .cloned()
        .collect();
    sort_newest_first(&mut matching);
    matching.truncate(limit);
    matching
}

/// Task store trait - implemented by all storage backends.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Return up to `limit` tasks owned by `user_id`, newest first,
    /// starting strictly after `after` when given.
    async fn query_page(
        &self,
        user_id: &str,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Task>, StoreError>;

    /// Insert a new task; the store assigns its id.
    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Get a single task owned by `user_id`.
    async fn get_task(&self, user_id: &str, id: &str) -> Result<Option<Task>, StoreError>;

    /// Patch the status field. Returns `false` if no task with that id belongs to `user_id`.
    async fn update_status(
        &self,
        user_id: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError>;

    /// Delete a task. Returns `false` if no task with that id belongs to `user_id`.
    async fn delete_task(&self, user_id: &str, id: &str) -> Result<bool, StoreError>;
}

/// Task store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStoreType {
    Memory,
    File,
    #[default]
    Sqlite,
}

impl TaskStoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "file" | "json" => Self::File,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }
}

/// Create a task store based on type and configuration.
pub async fn create_task_store(
    store_type: TaskStoreType,
    base_dir: PathBuf,
) -> Result<Box<dyn TaskStore>, StoreError> {
    match store_type {
        TaskStoreType::Memory => Ok(Box::new(InMemoryTaskStore::new())),
        TaskStoreType::File => {
            let store = FileTaskStore::new(base_dir).await?;
            Ok(Box::new(store))
        }
        TaskStoreType::Sqlite => {
            let store = SqliteTaskStore::new(base_dir).await?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, timestamp: &str, user: &str) -> Task {
        Task {
            id: id.to_string(),
            text: format!("task {}", id),
            timestamp: timestamp.to_string(),
            status: TaskStatus::NotStarted,
            user_id: user.to_string(),
        }
    }

    #[test]
    fn test_status_serializes_as_display_form() {
        let json = serde_json::to_string(&TaskStatus::NotStarted).unwrap();
        assert_eq!(json, "\"Not Started\"");
        let parsed: TaskStatus = serde_json::from_str("\"Completed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Completed);
    }

    #[test]
    fn test_status_parse_accepts_variants() {
        assert_eq!(TaskStatus::parse("Not Started"), Some(TaskStatus::NotStarted));
        assert_eq!(TaskStatus::parse("not_started"), Some(TaskStatus::NotStarted));
        assert_eq!(TaskStatus::parse("ONGOING"), Some(TaskStatus::Ongoing));
        assert_eq!(TaskStatus::parse("done"), None);
    }

    #[test]
    fn test_any_status_may_move_to_any_other() {
        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                assert!(from.can_transition_to(to), "{from} -> {to} should be allowed");
            }
        }
    }

    #[test]
    fn test_cursor_token_round_trips_and_rejects_garbage() {
        let cursor = task("a", "2026-10-18T09:00:00.000000000Z", "u").cursor();
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);

        assert!(matches!(Cursor::decode("not a cursor!"), Err(StoreError::InvalidCursor)));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(Cursor::decode(&not_json), Err(StoreError::InvalidCursor)));
    }

    #[test]
    fn test_select_page_orders_filters_and_resumes() {
        let tasks = vec![
            task("1", "2026-10-18T09:00:00.000000001Z", "alice"),
            task("2", "2026-10-18T09:00:00.000000003Z", "alice"),
            task("3", "2026-10-18T09:00:00.000000002Z", "bob"),
            task("4", "2026-10-18T09:00:00.000000002Z", "alice"),
        ];

        let first = select_page(&tasks, "alice", 2, None);
        let ids: Vec<_> = first.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4"]);

        let cursor = first.last().unwrap().cursor();
        let second = select_page(&tasks, "alice", 2, Some(&cursor));
        let ids: Vec<_> = second.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_id() {
        let tasks = vec![
            task("a", "2026-10-18T09:00:00.000000000Z", "u"),
            task("b", "2026-10-18T09:00:00.000000000Z", "u"),
        ];
        let first = select_page(&tasks, "u", 1, None);
        assert_eq!(first[0].id, "b");
        let rest = select_page(&tasks, "u", 5, Some(&first[0].cursor()));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "a");
    }

    #[test]
    fn test_store_type_parsing() {
        assert_eq!(TaskStoreType::from_str("memory"), TaskStoreType::Memory);
        assert_eq!(TaskStoreType::from_str("JSON"), TaskStoreType::File);
        assert_eq!(TaskStoreType::from_str("db"), TaskStoreType::Sqlite);
        assert_eq!(TaskStoreType::from_str("whatever"), TaskStoreType::Sqlite);
    }
}
