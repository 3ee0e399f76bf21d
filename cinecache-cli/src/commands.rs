//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cinecache_core::config::CinecacheConfig;
use cinecache_core::transcoding::{FfmpegEncoder, FfprobeDurationProbe};
use cinecache_core::{ArtifactStore, ProgressTracker, SourceId, TranscodeCoordinator};
use clap::Subcommand;
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the playback server
    Server {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding original uploads
        #[arg(long)]
        source_dir: Option<PathBuf>,
        /// Directory holding transcoded artifacts
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Transcode one film now, printing progress until it is ready
    Transcode {
        /// Source filename inside the source directory
        filename: String,
    },
    /// Print the duration the encoder would be measured against
    Probe {
        /// Path to a media file
        path: PathBuf,
    },
    /// List every playable title
    List,
}

/// Handle the CLI command
///
/// Environment variables configure every command; server flags override them.
///
/// # Errors
/// Returns the failure of whichever command ran
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let mut config = CinecacheConfig::from_env();
    match command {
        Commands::Server {
            host,
            port,
            source_dir,
            cache_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = source_dir {
                config.storage.source_dir = dir;
            }
            if let Some(dir) = cache_dir {
                config.storage.cache_dir = dir;
            }
            cinecache_web::run_server(config)
                .await
                .context("server failed")
        }
        Commands::Transcode { filename } => transcode(config, &filename).await,
        Commands::Probe { path } => probe(config, path).await,
        Commands::List => list(config).await,
    }
}

/// Transcode a single film without starting the server
///
/// # Errors
/// - Invalid filename, missing source, or a failed encoder run
pub async fn transcode(config: CinecacheConfig, filename: &str) -> anyhow::Result<()> {
    let id = SourceId::parse(filename)?;
    let store = ArtifactStore::new(&config.storage);
    store.ensure_dirs().await?;

    let coordinator = TranscodeCoordinator::new(
        store,
        ProgressTracker::new(),
        Arc::new(FfprobeDurationProbe::new(&config.transcode.ffprobe_path)),
        Arc::new(FfmpegEncoder::new(&config.transcode)),
        config.transcode.max_concurrent_transcodes,
    );

    let run = coordinator.ensure_ready(&id);
    tokio::pin!(run);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    let path = loop {
        tokio::select! {
            result = &mut run => break result?,
            _ = ticker.tick() => {
                let report = coordinator.tracker().report(&id);
                if report.status == "in_progress" {
                    println!("{:>6.1}%  eta {:>5.0}s", report.percent, report.eta);
                }
            }
        }
    };

    for (job_id, job) in coordinator.tracker().snapshot() {
        info!(
            "{}: {} after {:.1}s of media",
            job_id,
            job.status.as_str(),
            job.total_duration_seconds.unwrap_or_default()
        );
    }
    println!("Ready: {}", path.display());
    Ok(())
}

/// Print a media file's duration
///
/// # Errors
/// - The inspector could not be run or reported no usable duration
pub async fn probe(config: CinecacheConfig, path: PathBuf) -> anyhow::Result<()> {
    let probe = FfprobeDurationProbe::new(&config.transcode.ffprobe_path);
    let seconds = probe
        .try_probe(&path)
        .await
        .with_context(|| format!("probing {}", path.display()))?;
    println!("{}: {:.3}s", path.display(), seconds);
    Ok(())
}

/// List titles available for playback
///
/// # Errors
/// - A media directory exists but cannot be read
pub async fn list(config: CinecacheConfig) -> anyhow::Result<()> {
    let store = ArtifactStore::new(&config.storage);
    let titles = store.list_titles().await?;

    if titles.is_empty() {
        println!("No films in {}", store.source_dir().display());
        return Ok(());
    }
    for title in titles {
        let id = SourceId::parse(&title)?;
        let marker = if store.find_ready(&id).await.is_some() {
            "ready"
        } else {
            "source"
        };
        println!("{marker:<8} {title}");
    }
    Ok(())
}
