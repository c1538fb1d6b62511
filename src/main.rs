//! Quill - A small blog platform backend

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quill::{
    api::{self, AppState},
    config::Config,
    db,
};

/// How often expired tokens are purged
const TOKEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quill...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let pending = db::migrations::pending_count(&pool).await?;
    if pending > 0 {
        tracing::info!(pending, "Applying database migrations");
        db::migrations::run_migrations(&pool).await?;
    }
    tracing::info!("Database schema is up to date");

    let state = AppState::from_config(pool, &config);

    // Bootstrap the configured superuser, if any
    if let Some(admin) = state.user_service.ensure_superuser(&config.admin).await? {
        tracing::info!(user_id = admin.id, "Superuser ready: {}", admin.email);
    }

    // Start expired token cleanup task
    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TOKEN_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = user_service.cleanup_expired_tokens().await {
                    tracing::warn!("Token cleanup failed: {}", e);
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
