//! JSON file-based task store.

use super::{select_page, Cursor, NewTask, StoreError, Task, TaskStatus, TaskStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

const SNAPSHOT_FILE: &str = "tasks.json";

#[derive(Debug, Deserialize, Default)]
struct TaskStoreSnapshot {
    tasks: HashMap<String, Task>,
}

/// Tasks held in memory and written out as one JSON snapshot after each change.
///
/// Mutations hold the write lock across the snapshot write and are rolled back
/// if it fails, so memory never shows a change the file does not have.
#[derive(Clone)]
pub struct FileTaskStore {
    path: PathBuf,
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl FileTaskStore {
    pub async fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create task store dir: {}", e)))?;
        let path = base_dir.join(SNAPSHOT_FILE);
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<TaskStoreSnapshot>(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Failed to parse task store {}: {}", path.display(), e);
                    TaskStoreSnapshot::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => TaskStoreSnapshot::default(),
            Err(err) => {
                tracing::warn!("Failed to read task store {}: {}", path.display(), err);
                TaskStoreSnapshot::default()
            }
        };
        tracing::debug!(
            "Loaded {} tasks from {}",
            snapshot.tasks.len(),
            path.display()
        );

        Ok(Self {
            path,
            tasks: Arc::new(RwLock::new(snapshot.tasks)),
        })
    }

    /// Write `tasks` atomically (tmp file + rename). Callers hold the write lock.
    async fn persist(&self, tasks: &HashMap<String, Task>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(&SnapshotRef { tasks }).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize task store: {}", e))
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to write task store: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to finalize task store: {}", e)))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    tasks: &'a HashMap<String, Task>,
}

#[async_trait]
impl TaskStore for FileTaskStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn query_page(
        &self,
        user_id: &str,
        limit: usize,
        after: Option<&Cursor>,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(select_page(tasks.values(), user_id, limit, after))
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            text: task.text,
            timestamp: task.timestamp,
            status: task.status,
            user_id: task.user_id,
        };
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.clone(), task.clone());
        if let Err(e) = self.persist(&tasks).await {
            tasks.remove(&task.id);
            return Err(e);
        }
        Ok(task)
    }

    async fn get_task(&self, user_id: &str, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self
            .tasks
            .read()
            .await
            .get(id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn update_status(
        &self,
        user_id: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        let previous = match tasks.get_mut(id) {
            Some(task) if task.user_id == user_id => std::mem::replace(&mut task.status, status),
            _ => return Ok(false),
        };
        if let Err(e) = self.persist(&tasks).await {
            if let Some(task) = tasks.get_mut(id) {
                task.status = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn delete_task(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.get(id).is_some_and(|t| t.user_id == user_id) {
            return Ok(false);
        }
        let removed = tasks.remove(id);
        if let Err(e) = self.persist(&tasks).await {
            if let Some(task) = removed {
                tasks.insert(task.id.clone(), task);
            }
            return Err(e);
        }
        Ok(true)
    }
}
