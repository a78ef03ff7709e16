mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

use tradepost_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use tradepost_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    // Work orphaned by a previous crash goes back to the queue before the
    // pool starts polling.
    let recovered = app
        .queue
        .recover_stale(chrono::Duration::seconds(app.config.pipeline.stale_claim_secs as i64))
        .await?;
    if recovered > 0 {
        tracing::info!(
            event_name = "system.server.stale_tasks_recovered",
            correlation_id = "bootstrap",
            recovered,
            "recovered stale pipeline tasks"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = app.workers.spawn(shutdown_rx);

    let router = routes::router(app.state.clone()).merge(health::router(app.db_pool.clone()));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        workers = app.config.pipeline.workers,
        "tradepost-server started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tradepost-server stopping"
    );

    let _ = shutdown_tx.send(true);
    let drain = async {
        for worker in workers {
            let _ = worker.await;
        }
    };
    if tokio::time::timeout(
        Duration::from_secs(app.config.server.graceful_shutdown_secs),
        drain,
    )
    .await
    .is_err()
    {
        tracing::warn!(
            event_name = "system.server.drain_timed_out",
            correlation_id = "shutdown",
            "workers did not drain before the shutdown deadline"
        );
    }

    app.db_pool.close().await;
    Ok(())
}
