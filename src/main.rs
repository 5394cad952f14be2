use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use memoires_api::audit::TracingAuditSink;
use memoires_api::cli::Cli;
use memoires_api::clock::Clock;
use memoires_api::config::AppConfig;
use memoires_api::database::{MemoryStore, PgStore, Stores};
use memoires_api::server::{spawn_rate_limit_janitor, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("memoires_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting Memoires API in {:?} mode", config.environment);

    let mut pg = None;
    let stores = match config.database.url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, &config.database)
                .await
                .context("failed to connect to Postgres")?;
            if cli.migrate {
                store.migrate().await.context("schema migration failed")?;
            }
            let store = Arc::new(store);
            pg = Some(store.clone());
            Stores::from_backend(store)
        }
        None => {
            if cli.migrate {
                tracing::warn!("--migrate ignored: DATABASE_URL is not set");
            }
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let state = AppState::new(config, stores, Arc::new(TracingAuditSink), Clock::System)?;

    if let (Some(email), Some(password)) = (
        state.config.security.admin_email.as_deref(),
        state.config.security.admin_password.as_deref(),
    ) {
        match state.accounts.ensure_admin(email, password).await {
            Ok(true) => tracing::info!("Created administrator account {}", email),
            Ok(false) => {}
            Err(e) => tracing::error!("Could not create administrator account {}: {}", email, e),
        }
    }

    let window = state.config.api_keys.rate_limit_window_secs.max(1) as u64;
    let janitor = spawn_rate_limit_janitor(state.rate_limiter.clone(), state.clock, Duration::from_secs(window));

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Memoires API listening on http://{}", bind_addr);

    let app = memoires_api::build_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    janitor.abort();
    if let Some(pg) = pg {
        pg.close().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
