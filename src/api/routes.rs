//! HTTP route handlers.

use std::sync::Arc;

use axum::middleware;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::identity::{provider_for_config, IdentityProvider};
use crate::session::SessionManager;

use super::auth;
use super::dashboard::{DashboardHub, DASHBOARD_IDLE_TTL};
use super::repository::TaskRepository;
use super::task_store::{create_task_store, TaskStore};
use super::tasks;
use super::types::HealthResponse;
use super::views;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Task persistence with timestamps and retries
    pub repository: TaskRepository,
    /// Login flow and session tokens
    pub sessions: SessionManager,
    /// Per-user dashboard state
    pub dashboards: DashboardHub,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn TaskStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let secure_cookie = config.public_url.starts_with("https://");
        let sessions = SessionManager::new(provider, &config.auth, secure_cookie);
        let dashboards = DashboardHub::new(config.page_size, DASHBOARD_IDLE_TTL);
        Self {
            repository: TaskRepository::new(store),
            sessions,
            dashboards,
            config,
        }
    }
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/", get(views::landing))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/auth/callback", get(auth::callback))
        .route("/api/health", get(health))
        .route("/api/me", get(auth::me));

    let dashboard_routes = Router::new()
        .route("/dashboard", get(views::dashboard_page))
        .route("/dashboard/tasks", post(views::add_task))
        .route("/dashboard/tasks/:id/status", post(views::update_task_status))
        .route("/dashboard/tasks/:id/delete", post(views::delete_task))
        .route("/dashboard/next", post(views::next_page))
        .route("/dashboard/prev", post(views::previous_page))
        .route("/dashboard/notice/dismiss", post(views::dismiss_notice));

    let api_routes = Router::new()
        .nest("/api/tasks", tasks::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    public_routes
        .merge(dashboard_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn TaskStore> =
        Arc::from(create_task_store(config.store_type, config.data_dir.clone()).await?);
    if !store.is_persistent() {
        tracing::warn!("Using the in-memory task store; tasks are lost on restart");
    }
    let provider = provider_for_config(&config)?;
    tracing::info!("Identity provider: {}", provider.name());

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, store, provider));
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
        identity_provider: state.sessions.provider_name().to_string(),
        persistent_store: state.repository.store().is_persistent(),
    })
}
