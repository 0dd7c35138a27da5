//! taskpad - HTTP Server Entry Point
//!
//! Starts the HTTP server that serves the task manager.

use taskpad::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpad=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: store={:?}, data_dir={}, page_size={}, dev_mode={}",
        config.store_type,
        config.data_dir.display(),
        config.page_size,
        config.dev_mode
    );

    api::serve(config).await?;

    Ok(())
}
