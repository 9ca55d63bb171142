//! End-to-end: real transfer units driven by the MLFQ engine against an
//! in-process mock storage server (ranged GET + resumable upload session).

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;

use chunkferry::config::ChunkferryConfig;
use chunkferry::scheduler::{Level, TransferOutcome, TransferScheduler};
use chunkferry::transfer::{Credentials, DownloadUnit, TransferUnit, UploadUnit};

#[derive(Default)]
struct Storage {
    blob: Vec<u8>,
    uploaded: Mutex<Vec<u8>>,
}

#[derive(Clone)]
struct MockState {
    storage: Arc<Storage>,
    addr: SocketAddr,
}

async fn get_blob(
    State(state): State<MockState>,
    headers: HeaderMap,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Vec<u8>), StatusCode> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let span = range.strip_prefix("bytes=").ok_or(StatusCode::BAD_REQUEST)?;
    let (start, end) = span.split_once('-').ok_or(StatusCode::BAD_REQUEST)?;
    let start: usize = start.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let end: usize = end.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let data = &state.storage.blob;
    let total = data.len();
    let end = end.min(total.saturating_sub(1));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{total}"),
        )],
        data[start..=end].to_vec(),
    ))
}

async fn init_session(
    State(state): State<MockState>,
) -> (StatusCode, [(header::HeaderName, String); 1]) {
    (
        StatusCode::OK,
        [(
            header::LOCATION,
            format!("http://{}/session/1", state.addr),
        )],
    )
}

async fn accept_chunk(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    let range = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    state
        .storage
        .uploaded
        .lock()
        .unwrap()
        .extend_from_slice(&body);

    let (span, total) = range
        .strip_prefix("bytes ")
        .and_then(|r| r.rsplit_once('/'))
        .unwrap();
    let end: u64 = span.rsplit_once('-').unwrap().1.parse().unwrap();
    let total: u64 = total.parse().unwrap();
    if end + 1 < total {
        StatusCode::PERMANENT_REDIRECT // 308, resume incomplete
    } else {
        StatusCode::OK
    }
}

async fn spawn_storage(storage: Arc<Storage>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = MockState { storage, addr };
    let app = Router::new()
        .route("/blob", get(get_blob))
        .route("/upload/storage/v1/b/{bucket}/o", post(init_session))
        .route("/session/1", put(accept_chunk))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fast_config() -> ChunkferryConfig {
    let mut config = ChunkferryConfig::default();
    config.scheduler.idle_poll_ms = 1;
    config
}

fn creds() -> Credentials {
    Credentials {
        bearer: "integration-token".to_string(),
    }
}

#[tokio::test]
async fn test_download_and_upload_share_the_engine() {
    let storage = Arc::new(Storage {
        blob: (0..3072usize).map(|i| (i % 253) as u8).collect(),
        uploaded: Mutex::new(Vec::new()),
    });
    let addr = spawn_storage(storage.clone()).await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = fast_config();

    let scheduler = Arc::new(TransferScheduler::new(config.scheduler.clone()));
    let engine = scheduler.clone();
    tokio::spawn(async move { engine.run().await });

    let client = chunkferry::http_client(&config).unwrap();

    // Download: 3072 bytes at 1024 per step -> 3 steps.
    let dest = dir.path().join("cache/blob.bin");
    let download = DownloadUnit::open(
        client.clone(),
        &format!("http://{addr}/blob"),
        creds(),
        dest.clone(),
        config.transfer.download_chunk_size,
    )
    .await
    .unwrap();
    assert_eq!(download.burst_steps(), 3);

    // Upload: 500000 bytes at 262144 per step -> 2 steps.
    let source = dir.path().join("source.bin");
    let payload: Vec<u8> = (0..500_000usize).map(|i| (i % 239) as u8).collect();
    tokio::fs::write(&source, &payload).await.unwrap();
    let upload = UploadUnit::open(
        client.clone(),
        &format!("http://{addr}"),
        "test-bucket",
        "files/u1/doc.bin",
        creds(),
        source,
        config.transfer.upload_chunk_size,
    )
    .await
    .unwrap();
    assert_eq!(upload.burst_steps(), 2);

    let dl_handle = scheduler.submit(Box::new(download), Level::default()).await;
    let ul_handle = scheduler.submit(Box::new(upload), Level::default()).await;

    let (dl, ul) = tokio::time::timeout(Duration::from_secs(10), async {
        (dl_handle.wait().await, ul_handle.wait().await)
    })
    .await
    .expect("both transfers should finish well within the timeout");
    assert_eq!(dl, TransferOutcome::Completed);
    assert_eq!(ul, TransferOutcome::Completed);

    // Bytes landed whole on both sides.
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), storage.blob);
    assert_eq!(*storage.uploaded.lock().unwrap(), payload);

    // Polling is idempotent after completion.
    assert!(scheduler.is_complete(dl_handle.id).await);
    assert!(scheduler.is_complete(dl_handle.id).await);
    assert!(ul_handle.is_complete());

    // Both completions landed in the current stats window.
    let stats = scheduler.stats().await;
    assert_eq!(stats.len(), 2);
    for stat in stats {
        assert!(stat.turnaround_secs >= 0.0);
        assert!(stat.waiting_secs >= 0.0);
    }
}

#[tokio::test]
async fn test_submit_from_many_tasks() {
    let storage = Arc::new(Storage {
        blob: vec![7u8; 2048],
        uploaded: Mutex::new(Vec::new()),
    });
    let addr = spawn_storage(storage.clone()).await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = fast_config();

    let scheduler = Arc::new(TransferScheduler::new(config.scheduler.clone()));
    let engine = scheduler.clone();
    tokio::spawn(async move { engine.run().await });

    let client = chunkferry::http_client(&config).unwrap();

    // Several collaborator tasks submit concurrently with the running loop.
    let mut joins = Vec::new();
    for i in 0..4 {
        let scheduler = scheduler.clone();
        let client = client.clone();
        let dest = dir.path().join(format!("copy-{i}.bin"));
        let url = format!("http://{addr}/blob");
        joins.push(tokio::spawn(async move {
            let unit = DownloadUnit::open(client, &url, creds(), dest.clone(), 1024)
                .await
                .unwrap();
            let handle = scheduler.submit(Box::new(unit), Level::default()).await;
            handle.wait().await;
            dest
        }));
    }

    for join in joins {
        let dest = tokio::time::timeout(Duration::from_secs(10), join)
            .await
            .expect("transfer should finish")
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), storage.blob);
    }
}
