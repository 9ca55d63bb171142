//! Download unit -- ranged GETs against a remote object, appended to a
//! local cache file.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{burst_for, content_range_end, content_range_total};
use super::{Credentials, TransferError, TransferKind, TransferUnit};

#[derive(Debug)]
pub struct DownloadUnit {
    client: Client,
    url: String,
    credentials: Credentials,
    dest: PathBuf,
    chunk_size: u64,
    total: u64,
    offset: u64,
    burst: u32,
    complete: bool,
}

impl DownloadUnit {
    /// Probe the remote object for its total size and truncate the local
    /// destination file.
    ///
    /// The probe is a zero-length range request (`bytes=0-0`); its
    /// `Content-Range` reply carries the object size. Fails before any
    /// record is queued.
    pub async fn open(
        client: Client,
        url: &str,
        credentials: Credentials,
        dest: PathBuf,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::File::create(&dest).await?;

        let resp = client
            .get(url)
            .bearer_auth(&credentials.bearer)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransferError::ProbeFailed {
                status: resp.status().as_u16(),
            });
        }
        let header = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::ContentRange {
                reason: "probe reply had no Content-Range".to_string(),
            })?;
        let total = content_range_total(header)?;
        debug!(%url, total, "download probe complete");

        Ok(Self {
            client,
            url: url.to_string(),
            credentials,
            dest,
            chunk_size,
            total,
            offset: 0,
            burst: burst_for(total, chunk_size),
            complete: total == 0,
        })
    }

    pub fn destination(&self) -> &std::path::Path {
        &self.dest
    }
}

#[async_trait]
impl TransferUnit for DownloadUnit {
    fn kind(&self) -> TransferKind {
        TransferKind::Download
    }

    fn size_total(&self) -> u64 {
        self.total
    }

    fn burst_steps(&self) -> u32 {
        self.burst
    }

    async fn step(&mut self) -> Result<u64, TransferError> {
        let range = format!(
            "bytes={}-{}",
            self.offset,
            self.offset + self.chunk_size - 1
        );
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(&self.credentials.bearer)
            .header(RANGE, range)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransferError::ChunkRejected {
                status: resp.status().as_u16(),
                offset: self.offset,
            });
        }
        let header = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::ContentRange {
                reason: "chunk reply had no Content-Range".to_string(),
            })?;
        // The server's reply is authoritative for both the new offset and
        // the total; it may serve fewer bytes than asked.
        let (end, total) = content_range_end(header)?;
        let body = resp.bytes().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.dest)
            .await?;
        file.write_all(&body).await?;

        let advanced = end + 1 - self.offset;
        self.offset = end + 1;
        if self.offset >= total {
            self.complete = true;
        }
        Ok(advanced)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}
