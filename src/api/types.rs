//! API request and response types.

use serde::{Deserialize, Serialize};

use super::task_store::{Task, TaskStatus};
use crate::session::User;

/// Request to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// Task text; must contain something other than whitespace
    pub text: String,
}

/// Request to change a task's status.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskRequest {
    pub status: TaskStatus,
}

/// Query parameters for listing tasks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksQuery {
    /// Cursor returned by the previous page
    pub cursor: Option<String>,
    /// Page size override (defaults to the configured page size)
    pub limit: Option<usize>,
}

/// One page of tasks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPageResponse {
    pub tasks: Vec<Task>,
    /// Pass back as `cursor` to fetch the next page; absent when there is none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Current session.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: Option<User>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Whether the server is running in dev mode
    pub dev_mode: bool,

    /// Identity provider in use ("google" or "dev")
    pub identity_provider: String,

    /// Whether the task store survives restarts
    pub persistent_store: bool,
}

/// Form body for adding a task from the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct AddTaskForm {
    #[serde(default)]
    pub text: String,
}

/// Form body for the status selector.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Query parameters on the OAuth callback.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
