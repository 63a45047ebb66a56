use anyhow::Result;
use gatecrab_server::config::Config;
use gatecrab_server::state::AppState;
use gatecrab_server::transport::{Transport, http::HttpTransport};
use std::sync::Arc;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("gatecrab={}", config.log_level).parse()?),
        )
        .init();

    let state = Arc::new(AppState::from_config(&config)?);
    let sweepers = state.spawn_sweepers();

    tracing::info!(
        "GateCrab server started with quotas: {}",
        state.quota_names().collect::<Vec<_>>().join(", ")
    );
    tracing::info!(
        "Store capacity: {}, sweep interval: {}s, token TTL: {}s",
        config.store.capacity,
        config.store.sweep_interval,
        config.tokens.ttl
    );

    let mut transport_tasks = JoinSet::new();

    let transport = HttpTransport::new(&config.http.host, config.http.port)?;
    let http_state = state.clone();
    transport_tasks.spawn(async move {
        tracing::info!(
            "Starting HTTP transport on {}:{}",
            config.http.host,
            config.http.port
        );
        transport
            .start(http_state, Box::pin(shutdown_signal()))
            .await
    });

    let mut outcome = Ok(());
    while let Some(result) = transport_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                outcome = Err(e);
                break;
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                outcome = Err(anyhow::anyhow!("Transport task panicked"));
                break;
            }
        }
    }

    for sweeper in sweepers {
        sweeper.stop().await;
    }
    tracing::info!("GateCrab server stopped");

    outcome
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
