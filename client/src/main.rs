//! swizil-sync - one-shot sync of the persisted item queue.
//!
//! Restores the persisted state, drains pending changes against the remote
//! item store, refreshes the item list and persists the result.

use std::process::ExitCode;
use std::sync::Arc;
use swizil_client::{Config, Connectivity, FileBlobStore, HttpItemStore, SyncService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swizil_client=debug,swizil_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        api = %config.api_base_url,
        state_dir = %config.state_dir.display(),
        "Starting swizil-sync"
    );

    let remote = Arc::new(HttpItemStore::new(
        config.api_base_url.clone(),
        config.request_timeout,
    )?);
    let blobs = Arc::new(FileBlobStore::new(config.state_dir.clone()));
    // This process only runs when the host believes it is online.
    let connectivity = Connectivity::new(true);

    let (service, handle) = SyncService::restore(remote, blobs, connectivity.subscribe()).await?;
    let task = service.spawn();

    let before = handle.status().await?;
    tracing::info!(pending = before.pending_changes, "restored state");

    let report = handle.sync().await?;
    if let Err(err) = handle.fetch().await {
        tracing::warn!(error = %err, "fetch failed");
    }

    let status = handle.status().await?;
    let items = handle.items().await?.len();
    drop(handle);
    task.await?;

    tracing::info!(
        items,
        pending = status.pending_changes,
        resolved = report.result.len(),
        fetch = ?status.fetch_status,
        "sync complete"
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(error) = &report.error {
            tracing::error!(error = %error, "drain failed; changes stay queued");
        }
        Ok(ExitCode::FAILURE)
    }
}
