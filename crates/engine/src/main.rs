use std::sync::Arc;

use anyhow::Context;
use gentrack_core::clock::SystemClock;
use gentrack_db::SqliteSnapshotStorage;
use gentrack_engine::{EngineConfig, Session};
use gentrack_events::StoreEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gentrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env()?;
    tracing::info!(api_base_url = %config.api_base_url, "Loaded configuration");

    // --- Snapshot storage ---
    let storage = SqliteSnapshotStorage::connect(&config.database_url, config.snapshot_key.clone())
        .await
        .context("Failed to open snapshot database")?;
    tracing::info!(key = %storage.key(), "Snapshot storage ready");

    // --- Session ---
    let session = Session::start(config, Arc::new(storage), Arc::new(SystemClock)).await?;

    // Report settlements as they happen.
    let mut events = session.subscribe();
    let store = Arc::clone(session.store());
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::TaskSettled {
                    job_id,
                    status,
                    error,
                    ..
                }) => {
                    let unread = store.unread_count().await;
                    tracing::info!(%job_id, %status, error = ?error, unread, "Task settled");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Settlement reporter lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;

    session.shutdown().await;
    reporter.abort();
    Ok(())
}
