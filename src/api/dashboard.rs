//! Per-user dashboard state.
//!
//! Each signed-in user gets one long-lived [`Dashboard`] holding the page they
//! are looking at, the cursors needed to walk back to earlier pages, the
//! unsent input buffer and any store error notice. Actions for one user are
//! serialized through a mutex so a refetch can never race an older one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use super::repository::{TaskPage, TaskRepository};
use super::task_store::{Cursor, StoreError, Task, TaskStatus};

/// Dashboard state machine for a single user.
#[derive(Debug)]
pub struct Dashboard {
    user_id: String,
    page_size: usize,
    /// 1-based page number currently displayed
    page: usize,
    /// Cursor used to reach each page after the first; `cursors[n - 2]` reached page `n`.
    cursors: Vec<Cursor>,
    next_cursor: Option<Cursor>,
    tasks: Vec<Task>,
    input: String,
    loading: bool,
    notice: Option<String>,
    mounted: bool,
}

impl Dashboard {
    pub fn new(user_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            user_id: user_id.into(),
            page_size,
            page: 1,
            cursors: Vec::new(),
            next_cursor: None,
            tasks: Vec::new(),
            input: String::new(),
            loading: false,
            notice: None,
            mounted: false,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// "Next" is enabled only when the last fetch returned a cursor.
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// "Previous" is enabled only past the first page.
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Load the first page unless a load has already succeeded.
    pub async fn mount(&mut self, repo: &TaskRepository) {
        if !self.mounted {
            self.reload_first_page(repo).await;
        }
    }

    /// Refetch the page currently shown, using the cursor that reached it.
    ///
    /// Called on every dashboard view so tasks written elsewhere show up.
    pub async fn refresh(&mut self, repo: &TaskRepository) {
        if !self.mounted {
            self.reload_first_page(repo).await;
            return;
        }
        let cursor = self.cursors.last().cloned();
        if let Some(page) = self.fetch(repo, cursor.as_ref()).await {
            self.apply(page);
        }
    }

    /// Refetch page 1 and forget the cursor stack.
    pub async fn reload_first_page(&mut self, repo: &TaskRepository) {
        if let Some(page) = self.fetch(repo, None).await {
            self.cursors.clear();
            self.page = 1;
            self.mounted = true;
            self.apply(page);
        }
    }

    pub async fn next(&mut self, repo: &TaskRepository) {
        let Some(cursor) = self.next_cursor.clone() else {
            return;
        };
        if let Some(page) = self.fetch(repo, Some(&cursor)).await {
            self.cursors.push(cursor);
            self.page += 1;
            self.apply(page);
        }
    }

    pub async fn previous(&mut self, repo: &TaskRepository) {
        if !self.has_previous() {
            return;
        }
        // Drop the cursor that reached the current page; the one below it reached the previous page.
        let target = self.cursors.len().saturating_sub(2);
        let cursor = if self.cursors.len() >= 2 {
            Some(self.cursors[target].clone())
        } else {
            None
        };
        if let Some(page) = self.fetch(repo, cursor.as_ref()).await {
            self.cursors.pop();
            self.page -= 1;
            self.apply(page);
        }
    }

    /// Create a task from `text`. Blank input is ignored; success clears the
    /// input and returns to page 1.
    pub async fn add(&mut self, repo: &TaskRepository, text: &str) {
        self.input = text.to_string();
        match repo.create(&self.user_id, text).await {
            Ok(Some(_)) => {
                self.input.clear();
                self.reload_first_page(repo).await;
            }
            Ok(None) => {}
            Err(e) => self.fail("add the task", e),
        }
    }

    /// Change a task's status and patch the visible row without refetching.
    pub async fn update_status(&mut self, repo: &TaskRepository, id: &str, status: TaskStatus) {
        match repo.update_status(&self.user_id, id, status).await {
            Ok(true) => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
                    task.status = status;
                }
            }
            Ok(false) => {
                self.notice = Some("That task no longer exists.".to_string());
            }
            Err(e) => self.fail("update the task", e),
        }
    }

    /// Delete a task and return to page 1.
    pub async fn delete(&mut self, repo: &TaskRepository, id: &str) {
        match repo.delete(&self.user_id, id).await {
            Ok(_) => self.reload_first_page(repo).await,
            Err(e) => self.fail("delete the task", e),
        }
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    async fn fetch(&mut self, repo: &TaskRepository, after: Option<&Cursor>) -> Option<TaskPage> {
        self.loading = true;
        let result = repo.list_page(&self.user_id, self.page_size, after).await;
        self.loading = false;
        match result {
            Ok(page) => Some(page),
            Err(e) => {
                self.fail("load your tasks", e);
                None
            }
        }
    }

    fn apply(&mut self, page: TaskPage) {
        self.tasks = page.tasks;
        self.next_cursor = page.next_cursor;
    }

    fn fail(&mut self, action: &str, err: StoreError) {
        tracing::warn!("Dashboard for {} could not {}: {}", self.user_id, action, err);
        self.notice = Some(format!("Could not {}. Please try again.", action));
    }
}

/// Shared handle to one user's dashboard.
pub type DashboardRef = Arc<Mutex<Dashboard>>;

/// Dashboards untouched for this long are dropped on the next lookup.
pub const DASHBOARD_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct HubEntry {
    dashboard: DashboardRef,
    last_used: Instant,
}

/// All live dashboards, keyed by user id.
///
/// Entries are removed on logout and evicted once idle, so sessions that
/// simply expire do not pin their dashboard for the life of the process.
pub struct DashboardHub {
    page_size: usize,
    idle_ttl: Duration,
    dashboards: RwLock<HashMap<String, HubEntry>>,
}

impl DashboardHub {
    pub fn new(page_size: usize, idle_ttl: Duration) -> Self {
        Self {
            page_size,
            idle_ttl,
            dashboards: RwLock::new(HashMap::new()),
        }
    }

    /// Get the dashboard for `user_id`, creating it on first use.
    pub async fn get_or_create(&self, user_id: &str) -> DashboardRef {
        let mut dashboards = self.dashboards.write().await;
        let now = Instant::now();
        let before = dashboards.len();
        dashboards.retain(|uid, entry| {
            uid == user_id || now.duration_since(entry.last_used) < self.idle_ttl
        });
        if dashboards.len() < before {
            tracing::debug!("Evicted {} idle dashboards", before - dashboards.len());
        }

        let entry = dashboards
            .entry(user_id.to_string())
            .or_insert_with(|| HubEntry {
                dashboard: Arc::new(Mutex::new(Dashboard::new(user_id, self.page_size))),
                last_used: now,
            });
        entry.last_used = now;
        Arc::clone(&entry.dashboard)
    }

    /// Drop a user's dashboard (on logout).
    pub async fn remove(&self, user_id: &str) {
        self.dashboards.write().await.remove(user_id);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.dashboards.read().await.len()
    }
}
