//! API route definitions: transfer intake, completion polling, and the
//! rolling statistics window.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::scheduler::{Level, TransferId};
use crate::transfer::{Credentials, DownloadUnit, TransferKind, TransferUnit, UploadUnit};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/transfers", post(submit_transfer))
        .route("/transfers/{id}", get(poll_transfer))
        .route("/stats", get(stats_window))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Intake payload. `source`/`destination` are a remote URL and a local
/// path for downloads, a local path and `bucket/object` for uploads.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub kind: TransferKind,
    pub source: String,
    pub destination: String,
    pub bearer: String,
    /// Priority level 1-3; omitted means the lowest level.
    pub priority: Option<u8>,
}

async fn submit_transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let level = match req.priority {
        None => Level::default(),
        Some(n) => Level::from_number(n).ok_or((
            StatusCode::BAD_REQUEST,
            format!("priority must be 1-3, got {n}"),
        ))?,
    };
    let credentials = Credentials { bearer: req.bearer };

    // Unit constructors run the probe / session negotiation; failures
    // surface here and nothing is queued.
    let unit: Box<dyn TransferUnit> = match req.kind {
        TransferKind::Download => Box::new(
            DownloadUnit::open(
                state.client.clone(),
                &req.source,
                credentials,
                PathBuf::from(&req.destination),
                state.transfer.download_chunk_size,
            )
            .await
            .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?,
        ),
        TransferKind::Upload => {
            let (bucket, object) = req.destination.split_once('/').ok_or((
                StatusCode::BAD_REQUEST,
                "upload destination must be bucket/object".to_string(),
            ))?;
            Box::new(
                UploadUnit::open(
                    state.client.clone(),
                    &state.transfer.storage_base_url,
                    bucket,
                    object,
                    credentials,
                    PathBuf::from(&req.source),
                    state.transfer.upload_chunk_size,
                )
                .await
                .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?,
            )
        }
    };

    let burst = unit.burst_steps();
    let handle = state.scheduler.submit(unit, level).await;
    Ok(Json(json!({
        "data": {
            "id": handle.id,
            "kind": req.kind,
            "level": level.number(),
            "burst": burst
        }
    })))
}

async fn poll_transfer(State(state): State<AppState>, Path(id): Path<u64>) -> Json<Value> {
    let id = TransferId(id);
    let outcome = state.scheduler.outcome(id).await;
    Json(json!({
        "data": {
            "id": id,
            "finished": outcome.is_some(),
            "outcome": outcome
        }
    }))
}

async fn stats_window(State(state): State<AppState>) -> Json<Value> {
    let stats = state.scheduler.stats().await;
    let total = stats.len();
    Json(json!({
        "data": stats,
        "meta": { "total": total }
    }))
}
