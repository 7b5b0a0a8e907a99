// ABOUTME: Entry point for the logtap binary.
// ABOUTME: Loads LOGTAP_* config, opens the store, starts ingestion, and serves HTTP until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use logtap_core::spawn_ingestor;
use logtap_server::{AppState, LogtapConfig, create_router, open_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("logtap=debug,tower_http=debug")),
        )
        .init();

    let config = LogtapConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        source = %config.source.display(),
        bind = %config.bind,
        store = ?config.store,
        "logtap starting up"
    );

    let store = open_store(&config).await?;
    let ingestor = spawn_ingestor(config.ingest_config(), Arc::clone(&store));

    let state = Arc::new(
        AppState::new(store)
            .with_limits(config.limits())
            .with_ingest_stats(ingestor.stats()),
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("shutting down ingestion");
    let summary = ingestor.stop().await.context("ingestion task failed")?;
    tracing::info!(?summary, "logtap stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
