//! cvb-bundler - clip bundle release tool
//!
//! Runs one release: rows → clips.tsv + local clips → per-locale archives →
//! stats.json. Exit status is non-zero if the run aborts.

use anyhow::{Context, Result};
use clap::Parser;
use cvb_bundler::ReleaseRunner;
use cvb_common::config::BundlerConfig;
use cvb_common::events::{BundleEvent, EventBus};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cvb-bundler", version, about = "Bundle clips into a release")]
struct Args {
    /// Configuration file (falls back to CVB_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local output directory
    #[arg(long, env = "CVB_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Download and compute stats only; no archive upload
    #[arg(long)]
    skip_upload: bool,

    /// Release name (archive prefix)
    #[arg(long, env = "CVB_RELEASE")]
    release: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BundlerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(out_dir) = args.out_dir {
        config.out_dir = out_dir;
    }
    if let Some(release) = args.release {
        config.release = release;
    }
    config.skip_upload |= args.skip_upload;
    config.validate().context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting cvb-bundler {}", env!("CARGO_PKG_VERSION"));
    info!(release = %config.release, out_dir = %config.out_dir.display(), "Configuration loaded");

    let store = cvb_bundler::storage::from_config(&config.storage).context("Failed to set up object storage")?;
    let events = EventBus::default();
    let reporter = tokio::spawn(report_events(events.subscribe()));

    let runner = ReleaseRunner::new(config, store, events);
    let summary = runner.run().await.context("Release run failed")?;
    drop(runner);
    let _ = reporter.await;

    for clip in &summary.failed_clips {
        warn!(locale = %clip.locale, filename = %clip.filename, error = %clip.message, "Clip missing from release");
    }
    for failure in &summary.upload_failures {
        warn!(locale = %failure.locale, error = %failure.message, "Locale archive not uploaded");
    }
    info!(
        release = %summary.release,
        locales = summary.stats.locales.len(),
        total_hrs = summary.stats.total_hrs,
        total_valid_hrs = summary.stats.total_valid_hrs,
        "Release complete"
    );

    Ok(())
}

/// Render progress events as log lines until the bus closes
async fn report_events(mut rx: tokio::sync::broadcast::Receiver<BundleEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event {
                BundleEvent::RowsProcessed { rows } => info!(rows, "Progress: rows processed"),
                BundleEvent::ClipDownloaded { downloaded_total, .. } if downloaded_total % 1000 == 0 => {
                    info!(downloaded_total, "Progress: clips downloaded")
                }
                BundleEvent::ClipDownloaded { .. } => {}
                BundleEvent::UploadProgress { locale, bytes } => {
                    tracing::debug!(locale = %locale, bytes, "Progress: archive bytes uploaded")
                }
                other => info!(event = ?other, "Progress"),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress reporter lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
