//! Job board API server

use std::sync::Arc;

use anyhow::Context;
use jobboard_api::{AppState, routes};
use jobboard_config::{DEFAULT_PATH, JobBoardConfig, LogFormat};
use jobboard_core::HmacCapabilityAuthority;
use jobboard_db::{PgJobRepo, create_pool, run_migrations};
use jobboard_scheduler::{ReconcileLoop, Reconciler};
use jobboard_store::RedisQueueStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("JOBBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
    let config = JobBoardConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    info!(?config, "Loaded configuration");

    info!("Connecting to Redis...");
    let store = Arc::new(
        RedisQueueStore::connect(&config.redis_url, config.store_timeout)
            .await
            .context("Failed to connect to Redis")?,
    );

    info!("Connecting to database...");
    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    info!("Database connected");
    let repo = Arc::new(PgJobRepo::new(pool));

    let secret = match &config.capability_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("No capability secret configured; tokens will not survive a restart");
            uuid::Uuid::new_v4().to_string()
        }
    };
    let ttl = chrono::Duration::from_std(config.capability_ttl).context("Capability TTL out of range")?;
    let authority = Arc::new(HmacCapabilityAuthority::new(secret, ttl));

    // Reconcile loop
    let reconciler = Arc::new(Reconciler::new(store.clone(), store.clone()));
    let runner = ReconcileLoop::new(reconciler, config.reconcile_interval);
    let reports = runner.subscribe();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let reconcile_handle = tokio::spawn(runner.run(async move {
        let _ = stop_rx.changed().await;
    }));

    let state = AppState::new(store, repo, authority, reports, &config);
    let app = routes::router(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.listen);
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    let _ = stop_tx.send(true);
    reconcile_handle.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
