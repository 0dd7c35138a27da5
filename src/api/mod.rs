//! HTTP API and pages for the task manager.
//!
//! ## Pages
//!
//! - `GET /` - Sign-in page (redirects to `/dashboard` when signed in)
//! - `GET /dashboard` - Task list with add, status, delete and paging controls
//!
//! ## Endpoints
//!
//! - `POST /login`, `GET /auth/callback`, `POST /logout` - Session lifecycle
//! - `GET /api/health` - Health check
//! - `GET /api/me` - Current user
//! - `GET /api/tasks` - List tasks, newest first (cursor paginated)
//! - `POST /api/tasks` - Create a task
//! - `PATCH /api/tasks/{id}` - Change a task's status
//! - `DELETE /api/tasks/{id}` - Delete a task

mod auth;
pub mod dashboard;
pub mod repository;
mod routes;
pub mod task_store;
mod tasks;
pub mod types;
mod views;

pub use routes::{app, serve, AppState};
pub use types::*;
