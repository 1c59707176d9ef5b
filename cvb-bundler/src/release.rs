//! Release orchestration
//!
//! One end-to-end bundling run:
//! 1. Stream rows, write clips.tsv, download clips
//! 2. Run the corpus splitter (when configured)
//! 3. Sum clip durations and count buckets per locale
//! 4. Upload locale archives (unless `skip_upload`)
//! 5. Merge per-locale partials and calculate the aggregate stats
//! 6. Write stats.json locally and publish it next to the archives

use crate::layout::{ensure_dir, OutputLayout};
use crate::models::ClipRow;
use crate::pipeline::{DownloadPipeline, FailedClip, PipelineReport};
use crate::services::{
    count_buckets, run_corpus_splitter, Archiver, ClipFetcher, DurationSummarizer, UploadFailure,
};
use crate::source::{clip_rows, connect};
use crate::stats::{
    calculate_aggregate_stats, merge_partials, partials_from_locales, AggregateStats, LocalePartial,
    Partials,
};
use crate::storage::ObjectStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cvb_common::config::BundlerConfig;
use cvb_common::events::{BundleEvent, EventBus};
use cvb_common::{Error, Result};
use futures::Stream;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of a release run
#[derive(Debug)]
pub struct ReleaseSummary {
    pub release: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: AggregateStats,
    pub failed_clips: Vec<FailedClip>,
    pub upload_failures: Vec<UploadFailure>,
}

/// Object key of the published stats document
pub fn stats_key(release: &str) -> String {
    format!("{}/stats.json", release)
}

/// Locale directories in the output layout plus every locale seen in this run
///
/// A rerun against an existing output directory still measures and uploads
/// locales whose rows are absent from the current query.
fn release_locales(layout: &OutputLayout, report: &PipelineReport) -> Result<Vec<String>> {
    let mut locales: BTreeSet<String> = layout.locales()?.into_iter().collect();
    locales.extend(report.locales.keys().cloned());
    Ok(locales.into_iter().collect())
}

/// Runs a complete bundling release
pub struct ReleaseRunner {
    config: BundlerConfig,
    store: Arc<dyn ObjectStore>,
    events: EventBus,
}

impl ReleaseRunner {
    pub fn new(config: BundlerConfig, store: Arc<dyn ObjectStore>, events: EventBus) -> Self {
        Self {
            config,
            store,
            events,
        }
    }

    /// Run against the configured database and query
    pub async fn run(&self) -> Result<ReleaseSummary> {
        let sql = tokio::fs::read_to_string(&self.config.query_file)
            .await
            .map_err(|e| {
                Error::Config(format!(
                    "Cannot read query file {}: {}",
                    self.config.query_file.display(),
                    e
                ))
            })?;

        let pool = connect(&self.config.database_url).await?;
        tracing::info!("Database connection established");

        self.run_with_rows(clip_rows(pool, sql)).await
    }

    /// Run against an already-open row stream
    pub async fn run_with_rows<S>(&self, rows: S) -> Result<ReleaseSummary>
    where
        S: Stream<Item = Result<ClipRow>> + Send + 'static,
    {
        let started_at = Utc::now();
        let config = &self.config;
        let layout = OutputLayout::new(&config.out_dir);
        ensure_dir(layout.root()).await?;

        tracing::info!(
            release = %config.release,
            out_dir = %layout.root().display(),
            skip_upload = config.skip_upload,
            "Release run started"
        );

        let fetcher = ClipFetcher::new(self.store.clone(), config.storage.clips_bucket.clone())
            .with_retry(config.pipeline.fetch_attempts, config.pipeline.retry_backoff_ms);
        let pipeline = DownloadPipeline::new(
            layout.clone(),
            fetcher,
            config.pipeline.clone(),
            self.events.clone(),
        );
        let report = pipeline.run(rows).await?;

        if let Some(command) = &config.tools.splitter_command {
            run_corpus_splitter(command, &report.tsv_path, layout.root()).await?;
        }

        let locales = release_locales(&layout, &report)?;
        let (durations, buckets) = self.measure_locales(&layout, &locales).await?;

        let mut sources = vec![partials_from_locales(&report.locales), durations, buckets];
        let mut upload_failures = Vec::new();
        if !config.skip_upload {
            let archiver = Archiver::new(
                self.store.clone(),
                config.storage.bundle_bucket.clone(),
                config.release.clone(),
                layout.clone(),
                self.events.clone(),
            );
            let upload = archiver.upload_all(&locales).await;
            sources.push(
                upload
                    .sizes
                    .into_iter()
                    .map(|(locale, size)| (locale, LocalePartial::with_size(size)))
                    .collect(),
            );
            upload_failures = upload.failures;
        }

        let stats = calculate_aggregate_stats(&merge_partials(sources), &config.bundle_url_template());
        self.write_stats(&layout, &stats).await?;

        let PipelineReport { failed, .. } = report;
        let finished_at = Utc::now();
        tracing::info!(
            release = %config.release,
            locales = stats.locales.len(),
            total_hrs = stats.total_hrs,
            failed_clips = failed.len(),
            upload_failures = upload_failures.len(),
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "Release run finished"
        );

        Ok(ReleaseSummary {
            release: config.release.clone(),
            started_at,
            finished_at,
            stats,
            failed_clips: failed,
            upload_failures,
        })
    }

    /// Duration and bucket partials for each locale
    ///
    /// A duration tool failure aborts the run; a locale without a clips
    /// directory (every fetch failed) has zero duration.
    async fn measure_locales(
        &self,
        layout: &OutputLayout,
        locales: &[String],
    ) -> Result<(Partials, Partials)> {
        let summarizer = DurationSummarizer::new(self.config.tools.duration_command.clone())?;
        let mut durations = Partials::new();
        let mut buckets = Partials::new();

        for locale in locales {
            let clips_dir = layout.clips_dir(locale);
            let duration = if clips_dir.is_dir() {
                summarizer.locale_duration(&clips_dir).await?
            } else {
                tracing::warn!(locale = %locale, "No clips directory, duration is zero");
                0.0
            };
            durations.insert(locale.clone(), LocalePartial::with_duration(duration));

            let locale_dir = layout.locale_dir(locale);
            if locale_dir.is_dir() {
                let counts = count_buckets(&locale_dir)?;
                if !counts.is_empty() {
                    buckets.insert(locale.clone(), LocalePartial::with_buckets(counts));
                }
            }
        }

        Ok((durations, buckets))
    }

    async fn write_stats(&self, layout: &OutputLayout, stats: &AggregateStats) -> Result<()> {
        let json = serde_json::to_vec_pretty(stats)
            .map_err(|e| Error::Internal(format!("Failed to serialize stats: {}", e)))?;

        let local = layout.stats_path();
        tokio::fs::write(&local, &json).await?;
        tracing::info!(path = %local.display(), "stats.json written");
        self.events.emit_lossy(BundleEvent::StatsPublished {
            location: local.display().to_string(),
        });

        if self.config.skip_upload {
            return Ok(());
        }

        let key = stats_key(&self.config.release);
        let body = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from(json))]);
        self.store
            .put(&self.config.storage.bundle_bucket, &key, Box::pin(body))
            .await?;
        tracing::info!(bucket = %self.config.storage.bundle_bucket, key = %key, "stats.json published");
        self.events.emit_lossy(BundleEvent::StatsPublished {
            location: format!("{}/{}", self.config.storage.bundle_bucket, key),
        });
        Ok(())
    }
}
