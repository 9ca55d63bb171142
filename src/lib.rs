//! Chunkferry -- multi-level feedback-queue scheduling for chunked,
//! resumable cloud file transfers.
//!
//! This crate multiplexes uploads and downloads over a single execution
//! unit: each transfer is sliced into bounded steps (one ranged GET or one
//! resumable-session PUT), and an MLFQ engine with aging, round-robin
//! quanta, and shortest-remaining-time contention decides which transfer
//! advances next.

pub mod api;
pub mod config;
pub mod scheduler;
pub mod transfer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::state::AppState;
use crate::config::ChunkferryConfig;
use crate::scheduler::TransferScheduler;

/// Build the shared HTTP client used by all transfer units.
pub fn http_client(config: &ChunkferryConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.transfer.request_timeout_secs))
        .build()?;
    Ok(client)
}

/// Start the chunkferry daemon: the MLFQ engine plus the intake/poll/stats API.
pub async fn serve(bind: &str, config: ChunkferryConfig) -> Result<()> {
    // 1. Initialize the scheduler.
    let scheduler = Arc::new(TransferScheduler::new(config.scheduler.clone()));

    // 2. Start the MLFQ engine (background task).
    let engine = scheduler.clone();
    tokio::spawn(async move {
        engine.run().await;
    });

    // 3. Start the API server.
    let state = AppState {
        scheduler,
        transfer: config.transfer.clone(),
        client: http_client(&config)?,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind.parse()?;
    tracing::info!(%addr, "chunkferry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
