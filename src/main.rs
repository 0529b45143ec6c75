//! bank_ledger daemon
//!
//! Connects to PostgreSQL, makes sure the ledger schema exists and drains the
//! task outbox until Ctrl-C.
//!
//! ```text
//! bank_ledger [--env dev|prod]
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use bank_ledger::config::AppConfig;
use bank_ledger::db::{Database, schema};
use bank_ledger::logging::init_logging;
use bank_ledger::outbox::{LogDistributor, OutboxWorker, WorkerConfig};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        revision = env!("LEDGER_BUILD_REV"),
        "Starting bank_ledger"
    );

    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database health check failed")?;
    schema::ensure_schema(db.pool())
        .await
        .context("Failed to prepare ledger schema")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = if config.outbox.enabled {
        let worker = OutboxWorker::new(
            db.store(),
            Arc::new(LogDistributor),
            WorkerConfig::from(&config.outbox),
        );
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    } else {
        tracing::info!("Outbox worker disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    // Receiver may already be gone when the worker is disabled
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        handle.await.context("Outbox worker panicked")?;
    }

    db.close().await;
    tracing::info!("bank_ledger stopped");
    Ok(())
}
