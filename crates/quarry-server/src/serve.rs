use crate::components::{self, Capabilities, Components};
use crate::config::QuarryConfig;
use crate::http::{self, AppState};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// How often expired conversations are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run(config: QuarryConfig) -> anyhow::Result<()> {
    info!("Starting Quarry server v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP: {}", config.server.http_addr);
    info!("Data: {:?}", config.server.data_dir);

    std::fs::create_dir_all(&config.server.data_dir)?;

    let caps = Capabilities::from_config(&config)?;
    let components = components::build(&config, caps)?;

    let purge_task = {
        let conversations = components.conversations.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PURGE_INTERVAL).await;
                match conversations.purge_expired() {
                    Ok(0) => {}
                    Ok(n) => info!("Dropped {} expired conversations", n),
                    Err(e) => error!("Conversation purge failed: {}", e),
                }
            }
        })
    };

    let app = http::create_router(AppState::new(components.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.server.http_addr).await?;
    info!("Quarry server ready on {}", config.server.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge_task.abort();
    persist_on_exit(&components).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, terminating...");
}

async fn persist_on_exit(components: &Components) {
    let index = components.index.clone();
    match tokio::task::spawn_blocking(move || index.persist()).await {
        Ok(Ok(())) => info!("Similarity index persisted ({} documents)", components.index.count()),
        Ok(Err(e)) => error!("Failed to persist similarity index: {}", e),
        Err(e) => error!("Persist task failed: {}", e),
    }
}
