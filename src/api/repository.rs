//! Task repository: the query/mutation layer the dashboard and JSON API talk to.
//!
//! Wraps a [`TaskStore`] backend, stamps new tasks with a strictly increasing
//! creation timestamp, turns store pages into [`TaskPage`]s with a resume
//! cursor, and retries transient store failures with exponential backoff.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use super::task_store::{Cursor, NewTask, StoreError, Task, TaskStatus, TaskStore};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Configuration for retry behavior on transient store errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent attempt
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff: base * 2^attempt, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// One page of a user's tasks.
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    /// Cursor of the last task when the page came back full, `None` otherwise.
    ///
    /// A full page that happens to be the last one still yields a cursor; the
    /// following fetch is then empty.
    pub next_cursor: Option<Cursor>,
}

/// Return `text` if it contains something other than whitespace.
pub fn validate_task_text(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct TaskRepository {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry: RetryConfig::default(),
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Next creation timestamp; strictly greater than any previously issued one.
    fn next_timestamp(&self) -> String {
        let now = self.clock.now();
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let ts = match *last {
            Some(prev) if prev >= now => prev + chrono::Duration::nanoseconds(1),
            _ => now,
        };
        *last = Some(ts);
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retrying in {:?} (attempt {}/{})",
                        op,
                        e,
                        delay,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", op, e);
                    return Err(e);
                }
            }
        }
    }

    /// Fetch up to `page_size` tasks for `user_id`, newest first, resuming after `after`.
    pub async fn list_page(
        &self,
        user_id: &str,
        page_size: usize,
        after: Option<&Cursor>,
    ) -> Result<TaskPage, StoreError> {
        let tasks = self
            .with_retry("list_page", move || {
                self.store.query_page(user_id, page_size, after)
            })
            .await?;
        let next_cursor = if page_size > 0 && tasks.len() == page_size {
            tasks.last().map(Task::cursor)
        } else {
            None
        };
        Ok(TaskPage { tasks, next_cursor })
    }

    /// Create a task. Blank or whitespace-only text is a no-op and yields `None`.
    pub async fn create(&self, user_id: &str, text: &str) -> Result<Option<Task>, StoreError> {
        let Some(text) = validate_task_text(text) else {
            tracing::debug!("Ignoring blank task for user {}", user_id);
            return Ok(None);
        };
        let new_task = NewTask {
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp: self.next_timestamp(),
            status: TaskStatus::NotStarted,
        };
        let task = self
            .with_retry("create", || self.store.insert_task(new_task.clone()))
            .await?;
        tracing::info!("Created task {} for user {}", task.id, user_id);
        Ok(Some(task))
    }

    /// Set a task's status. Returns `false` when the task does not exist for this
    /// user or the transition is not permitted.
    pub async fn update_status(
        &self,
        user_id: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<bool, StoreError> {
        let Some(current) = self
            .with_retry("get_task", move || self.store.get_task(user_id, id))
            .await?
        else {
            return Ok(false);
        };
        if !current.status.can_transition_to(status) {
            tracing::warn!(
                "Rejected status change {} -> {} for task {}",
                current.status,
                status,
                id
            );
            return Ok(false);
        }
        let updated = self
            .with_retry("update_status", move || {
                self.store.update_status(user_id, id, status)
            })
            .await?;
        if updated {
            tracing::info!("Task {} status -> {}", id, status);
        }
        Ok(updated)
    }

    /// Delete a task unconditionally. Returns whether anything was removed.
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .with_retry("delete", move || self.store.delete_task(user_id, id))
            .await?;
        if deleted {
            tracing::info!("Deleted task {} for user {}", id, user_id);
        }
        Ok(deleted)
    }

    /// Fetch one task owned by `user_id`.
    pub async fn get(&self, user_id: &str, id: &str) -> Result<Option<Task>, StoreError> {
        self.with_retry("get_task", move || self.store.get_task(user_id, id))
            .await
    }
}
