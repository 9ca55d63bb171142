//! TOML configuration for chunkferry.
//!
//! Layered model with compiled-in defaults, environment variable override
//! for the config file path, and a standard filesystem location.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the chunkferry process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkferryConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChunkferryConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `CHUNKFERRY_CONFIG` environment variable.
    /// 2. `/etc/chunkferry/chunkferry.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("CHUNKFERRY_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CHUNKFERRY_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/chunkferry/chunkferry.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// MLFQ policy knobs, all counted in scheduler ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Ticks a queued record waits before moving up one priority level.
    pub aging_threshold: u32,
    /// Ticks a round-robin (level 2) record runs before its quantum expires.
    pub time_quantum: u32,
    /// Ticks a record may run at one level before being demoted.
    pub lower_priority_threshold: u32,
    /// Span of the rolling statistics window, in seconds.
    pub stats_window_secs: u64,
    /// Sleep between ticks while all queues are empty, in milliseconds.
    pub idle_poll_ms: u64,
    /// Consecutive failed steps before a record is abandoned.
    pub max_step_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            aging_threshold: 10,
            time_quantum: 3,
            lower_priority_threshold: 5,
            stats_window_secs: 60,
            idle_poll_ms: 100,
            max_step_failures: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Chunking and remote-endpoint configuration for transfer units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes fetched per download step.
    pub download_chunk_size: u64,
    /// Bytes sent per upload step (resumable sessions want multiples of 256 KiB).
    pub upload_chunk_size: u64,
    /// Base URL of the storage service for resumable upload sessions.
    pub storage_base_url: String,
    /// Per-request timeout for the HTTP client, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_chunk_size: 1024,
            upload_chunk_size: 262_144,
            storage_base_url: "https://storage.googleapis.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
