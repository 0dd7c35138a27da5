//! In-memory task store (non-persistent).

use super::{select_page, Cursor, NewTask, StoreError, Task, TaskStatus, TaskStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn is_persistent(&self) -> bool {
        false
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
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
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
        match tasks.get_mut(id) {
            Some(task) if task.user_id == user_id => {
                task.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_task(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(id).is_some_and(|t| t.user_id == user_id) {
            tasks.remove(id);
            return Ok(true);
        }
        Ok(false)
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
    async fn test_insert_assigns_unique_ids() {
        let store = InMemoryTaskStore::new();
        let a = store.insert_task(new_task("u", "a", 1)).await.unwrap();
        let b = store.insert_task(new_task("u", "b", 2)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.query_page("u", 10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_are_scoped_to_owner() {
        let store = InMemoryTaskStore::new();
        let task = store.insert_task(new_task("alice", "a", 1)).await.unwrap();

        assert!(!store
            .update_status("mallory", &task.id, TaskStatus::Completed)
            .await
            .unwrap());
        assert!(!store.delete_task("mallory", &task.id).await.unwrap());
        assert!(store.get_task("mallory", &task.id).await.unwrap().is_none());

        let unchanged = store.get_task("alice", &task.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_delete_removes_task() {
        let store = InMemoryTaskStore::new();
        let task = store.insert_task(new_task("u", "a", 1)).await.unwrap();
        assert!(store.delete_task("u", &task.id).await.unwrap());
        assert!(!store.delete_task("u", &task.id).await.unwrap());
        assert!(store.query_page("u", 10, None).await.unwrap().is_empty());
    }
}
