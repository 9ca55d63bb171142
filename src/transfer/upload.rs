//! Upload unit -- resumable upload session fed one chunk per step.

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION};
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::{burst_for, Credentials, TransferError, TransferKind, TransferUnit};

#[derive(Debug)]
pub struct UploadUnit {
    client: Client,
    session_url: String,
    credentials: Credentials,
    source: PathBuf,
    chunk_size: u64,
    file_size: u64,
    offset: u64,
    burst: u32,
    complete: bool,
}

impl UploadUnit {
    /// Initiate a resumable upload session for `source`.
    ///
    /// POSTs the session request against the storage service and keeps the
    /// session URL from the `Location` header. Fails before any record is
    /// queued.
    pub async fn open(
        client: Client,
        base_url: &str,
        bucket: &str,
        object: &str,
        credentials: Credentials,
        source: PathBuf,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        let file_size = tokio::fs::metadata(&source).await?.len();

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=resumable&name={}",
            base_url.trim_end_matches('/'),
            bucket,
            object
        );
        let resp = client
            .post(&url)
            .bearer_auth(&credentials.bearer)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header("X-Upload-Content-Type", "application/octet-stream")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransferError::SessionInit {
                status: resp.status().as_u16(),
            });
        }
        let session_url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(TransferError::MissingLocation)?
            .to_string();
        debug!(%bucket, %object, file_size, "upload session opened");

        Ok(Self {
            client,
            session_url,
            credentials,
            source,
            chunk_size,
            file_size,
            offset: 0,
            burst: burst_for(file_size, chunk_size),
            complete: false,
        })
    }
}

#[async_trait]
impl TransferUnit for UploadUnit {
    fn kind(&self) -> TransferKind {
        TransferKind::Upload
    }

    fn size_total(&self) -> u64 {
        self.file_size
    }

    fn burst_steps(&self) -> u32 {
        self.burst
    }

    async fn step(&mut self) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::open(&self.source).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut chunk = vec![0u8; self.chunk_size as usize];
        let mut filled = 0;
        while filled < chunk.len() {
            let n = file.read(&mut chunk[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        chunk.truncate(filled);
        if chunk.is_empty() {
            // Nothing left to read; the file is shorter than estimated.
            self.complete = true;
            return Ok(0);
        }

        let end = self.offset + chunk.len() as u64 - 1;
        let content_range = format!("bytes {}-{}/{}", self.offset, end, self.file_size);
        let resp = self
            .client
            .put(&self.session_url)
            .bearer_auth(&self.credentials.bearer)
            .header(CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await?;

        let status = resp.status();
        // 308 Resume Incomplete means the chunk landed and the session
        // expects more; anything else non-2xx is a failed, retryable step.
        if !status.is_success() && status.as_u16() != 308 {
            return Err(TransferError::ChunkRejected {
                status: status.as_u16(),
                offset: self.offset,
            });
        }

        let advanced = end + 1 - self.offset;
        self.offset = end + 1;
        if self.offset >= self.file_size {
            self.complete = true;
        }
        Ok(advanced)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}
