//! # taskpad
//!
//! A minimal multi-user task manager.
//!
//! - Google sign-in (or a local dev identity) with JWT session cookies
//! - Per-user tasks in a pluggable store (memory, JSON file, SQLite)
//! - A server-rendered, paginated dashboard plus a small JSON API
//!
//! ## Modules
//! - `api`: routes, dashboard state, task repository and stores
//! - `session` / `identity`: login flow and identity providers
//! - `config`: environment-driven configuration

pub mod api;
pub mod config;
pub mod identity;
pub mod session;
pub mod util;

pub use config::Config;
pub use session::User;
