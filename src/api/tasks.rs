//! JSON task API, mounted at `/api/tasks` behind `require_auth`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};

use super::routes::AppState;
use super::task_store::{Cursor, StoreError, Task};
use super::types::{CreateTaskRequest, ListTasksQuery, TaskPageResponse, UpdateTaskRequest};
use crate::session::User;
use crate::util::internal_error;

/// Largest page a client may ask for.
const MAX_PAGE_SIZE: usize = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", patch(update_task).delete(delete_task))
}

fn store_error(err: StoreError) -> (StatusCode, String) {
    match err {
        StoreError::InvalidCursor => (StatusCode::BAD_REQUEST, err.to_string()),
        StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => {
            tracing::error!("Task store error: {}", other);
            internal_error(other)
        }
    }
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<TaskPageResponse>, (StatusCode, String)> {
    let after = query
        .cursor
        .as_deref()
        .map(Cursor::decode)
        .transpose()
        .map_err(store_error)?;
    let limit = query
        .limit
        .unwrap_or(state.config.page_size)
        .clamp(1, MAX_PAGE_SIZE);

    let page = state
        .repository
        .list_page(&user.uid, limit, after.as_ref())
        .await
        .map_err(store_error)?;

    Ok(Json(TaskPageResponse {
        tasks: page.tasks,
        next_cursor: page.next_cursor.map(|c| c.encode()),
    }))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    match state
        .repository
        .create(&user.uid, &req.text)
        .await
        .map_err(store_error)?
    {
        Some(task) => Ok((StatusCode::CREATED, Json(task))),
        None => Err((
            StatusCode::BAD_REQUEST,
            "Task text must not be blank".to_string(),
        )),
    }
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let updated = state
        .repository
        .update_status(&user.uid, &id, req.status)
        .await
        .map_err(store_error)?;
    if !updated {
        return Err((StatusCode::NOT_FOUND, format!("Task {} not found", id)));
    }
    state
        .repository
        .get(&user.uid, &id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {} not found", id)))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state
        .repository
        .delete(&user.uid, &id)
        .await
        .map_err(store_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Task {} not found", id)))
    }
}
