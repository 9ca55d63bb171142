use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chunkferry::config::ChunkferryConfig;
use chunkferry::scheduler::{Level, TransferOutcome, TransferScheduler};
use chunkferry::transfer::{Credentials, DownloadUnit, TransferUnit, UploadUnit};

#[derive(Parser)]
#[command(
    name = "chunkferry",
    about = "MLFQ scheduling for chunked, resumable cloud file transfers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (falls back to CHUNKFERRY_CONFIG, then
    /// /etc/chunkferry/chunkferry.toml, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (intake/poll/stats API + scheduler engine)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Download one remote object through the scheduler and wait for it
    Download {
        /// Remote object URL
        #[arg(long)]
        url: String,

        /// Local destination path
        #[arg(long)]
        dest: PathBuf,

        /// Bearer token for the storage service
        #[arg(long, env = "CHUNKFERRY_BEARER")]
        bearer: String,

        /// Priority level 1-3 (1 is highest; default is the lowest level)
        #[arg(long)]
        priority: Option<u8>,
    },

    /// Upload one local file through the scheduler and wait for it
    Upload {
        /// Local source path
        #[arg(long)]
        source: PathBuf,

        /// Destination bucket
        #[arg(long)]
        bucket: String,

        /// Destination object name
        #[arg(long)]
        object: String,

        /// Bearer token for the storage service
        #[arg(long, env = "CHUNKFERRY_BEARER")]
        bearer: String,

        /// Priority level 1-3 (1 is highest; default is the lowest level)
        #[arg(long)]
        priority: Option<u8>,
    },
}

fn parse_level(priority: Option<u8>) -> Result<Level> {
    match priority {
        None => Ok(Level::default()),
        Some(n) => {
            Level::from_number(n).ok_or_else(|| anyhow::anyhow!("priority must be 1-3, got {n}"))
        }
    }
}

/// Run a single transfer to completion on a private scheduler instance.
async fn run_one(unit: Box<dyn TransferUnit>, level: Level, config: &ChunkferryConfig) -> Result<()> {
    let scheduler = Arc::new(TransferScheduler::new(config.scheduler.clone()));
    let engine = scheduler.clone();
    tokio::spawn(async move {
        engine.run().await;
    });

    let burst = unit.burst_steps();
    let handle = scheduler.submit(unit, level).await;
    println!("Transfer {} queued ({} steps estimated).", handle.id, burst);

    match handle.wait().await {
        TransferOutcome::Completed => {
            for stat in scheduler.stats().await {
                println!(
                    "Done. turnaround={:.2}s waiting={:.2}s",
                    stat.turnaround_secs, stat.waiting_secs
                );
            }
            Ok(())
        }
        TransferOutcome::Failed => anyhow::bail!("transfer abandoned after repeated step failures"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ChunkferryConfig::load(path)?,
        None => ChunkferryConfig::load_or_default(),
    };

    // Initialize tracing; RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting chunkferry daemon");
            chunkferry::serve(&bind, config).await?;
        }
        Commands::Download {
            url,
            dest,
            bearer,
            priority,
        } => {
            let level = parse_level(priority)?;
            let client = chunkferry::http_client(&config)?;
            let unit = DownloadUnit::open(
                client,
                &url,
                Credentials { bearer },
                dest,
                config.transfer.download_chunk_size,
            )
            .await?;
            println!("Downloading {} bytes.", unit.size_total());
            run_one(Box::new(unit), level, &config).await?;
        }
        Commands::Upload {
            source,
            bucket,
            object,
            bearer,
            priority,
        } => {
            let level = parse_level(priority)?;
            let client = chunkferry::http_client(&config)?;
            let unit = UploadUnit::open(
                client,
                &config.transfer.storage_base_url,
                &bucket,
                &object,
                Credentials { bearer },
                source,
                config.transfer.upload_chunk_size,
            )
            .await?;
            println!("Uploading {} bytes.", unit.size_total());
            run_one(Box::new(unit), level, &config).await?;
        }
    }

    Ok(())
}
