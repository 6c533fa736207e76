// Main entry point for the task coordinator

use std::sync::Arc;

use anyhow::{Context, Result};
use extraction_client::ExtractionClient;
use kg_server::domains::billing::{ModelRateCatalog, QuotaEnforcer};
use kg_server::kernel::{ExtractionServiceAdapter, FsBlobStore, ServerDeps};
use kg_server::server::{build_app, AxumAppState};
use kg_server::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kg_server=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting knowledge graph task coordinator");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Usage pricing
    let rates = match &config.model_rates_path {
        Some(path) => ModelRateCatalog::load(path)
            .await
            .with_context(|| format!("Failed to load model rates from {}", path.display()))?,
        None => {
            tracing::warn!("MODEL_RATES_PATH not set, every model is billed at 1.0x");
            ModelRateCatalog::default()
        }
    };
    let quota = QuotaEnforcer::new(config.plan_quotas, rates);

    // Build dependencies
    let extraction = ExtractionServiceAdapter::new(ExtractionClient::new(
        config.extraction_service_url.clone(),
    ));
    let blob_store = FsBlobStore::new(config.blob_root.clone());
    tracing::info!(
        extraction_service = %config.extraction_service_url,
        blob_root = %config.blob_root.display(),
        "Dependencies ready"
    );

    let deps = ServerDeps::new(
        pool,
        Arc::new(extraction),
        Arc::new(blob_store),
        quota,
        config.llm.clone(),
    );
    let bridge = deps.bridge.clone();

    let app = build_app(AxumAppState::new(deps), &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    let closed = bridge.stop_all();
    tracing::info!(closed, "Status streams closed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
