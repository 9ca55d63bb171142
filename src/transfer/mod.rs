//! Transfer units -- chunked, resumable upload/download work items.
//!
//! A unit owns the wire-level state of one transfer (offsets, session URL,
//! destination file) and performs exactly one bounded network step per
//! `step` call. The scheduler never sees bytes, only step outcomes.

pub mod download;
pub mod upload;

use async_trait::async_trait;
use thiserror::Error;

pub use download::DownloadUnit;
pub use upload::UploadUnit;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("size probe failed with status {status}")]
    ProbeFailed { status: u16 },

    #[error("resumable session initiation failed with status {status}")]
    SessionInit { status: u16 },

    #[error("session response missing Location header")]
    MissingLocation,

    #[error("server returned {status} for chunk at offset {offset}")]
    ChunkRejected { status: u16, offset: u64 },

    #[error("missing or malformed Content-Range header: {reason}")]
    ContentRange { reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which direction a transfer moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Download,
    Upload,
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferKind::Download => write!(f, "download"),
            TransferKind::Upload => write!(f, "upload"),
        }
    }
}

/// Bearer credentials for the remote storage service.
///
/// Token acquisition and refresh belong to the auth collaborator; units
/// only attach what they are handed.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub bearer: String,
}

/// One chunked, resumable transfer.
///
/// Constructors perform the initial probe / session negotiation and fail
/// before the unit exists; a unit that failed to initialize is never
/// scheduled.
#[async_trait]
pub trait TransferUnit: Send {
    fn kind(&self) -> TransferKind;

    /// Total size in bytes, known after construction.
    fn size_total(&self) -> u64;

    /// Estimated number of steps to finish, captured at construction.
    fn burst_steps(&self) -> u32;

    /// Perform one bounded unit of work. Returns the bytes advanced.
    ///
    /// An error means zero progress; the unit is safe to retry on its
    /// next scheduled turn.
    async fn step(&mut self) -> Result<u64, TransferError>;

    fn is_complete(&self) -> bool;
}

/// Steps needed to move `total` bytes in `chunk_size` slices.
pub(crate) fn burst_for(total: u64, chunk_size: u64) -> u32 {
    total.div_ceil(chunk_size) as u32
}

/// Total size from a `Content-Range` header such as `bytes 0-0/3072`.
pub(crate) fn content_range_total(header: &str) -> Result<u64, TransferError> {
    let (_, total) = header
        .rsplit_once('/')
        .ok_or_else(|| TransferError::ContentRange {
            reason: format!("no '/' in {header:?}"),
        })?;
    total.trim().parse().map_err(|_| TransferError::ContentRange {
        reason: format!("total {total:?} is not an integer"),
    })
}

/// Range end and total from a `Content-Range` header (`bytes start-end/total`).
pub(crate) fn content_range_end(header: &str) -> Result<(u64, u64), TransferError> {
    let total = content_range_total(header)?;
    let span = header
        .rsplit_once('/')
        .map(|(head, _)| head)
        .unwrap_or(header);
    let (_, end) = span
        .rsplit_once('-')
        .ok_or_else(|| TransferError::ContentRange {
            reason: format!("no range span in {header:?}"),
        })?;
    let end = end.trim().parse().map_err(|_| TransferError::ContentRange {
        reason: format!("range end {end:?} is not an integer"),
    })?;
    Ok((end, total))
}
