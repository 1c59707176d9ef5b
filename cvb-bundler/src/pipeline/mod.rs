//! Download pipeline
//!
//! One consumer loop owns the aggregator, TSV writer, backpressure
//! controller and completion coordinator. Rows arrive from a `RowSource` in
//! order; each row is aggregated, written to clips.tsv and handed to a
//! download task in a `JoinSet`. While backpressure holds the source paused
//! the loop only drains finished downloads.
//!
//! Every download reaches exactly one terminal state (downloaded, already
//! present, or failed after retries) and each terminal state decrements the
//! in-flight count, so a failing clip can never stall completion.
//!
//! Concurrent downloads write disjoint paths. A repeated (locale, id) row
//! whose clip is still in flight is written to clips.tsv but not fetched
//! again.

pub mod aggregator;
pub mod backpressure;
pub mod completion;

pub use aggregator::RowAggregator;
pub use backpressure::{BackpressureController, FlowSignal};
pub use completion::CompletionCoordinator;

use crate::layout::{ensure_dir, OutputLayout};
use crate::models::{ClipRow, LocaleStats};
use crate::services::{ClipFetcher, FetchStatus, TsvWriter};
use crate::source::{RowSource, SourceControl};
use cvb_common::config::PipelineSettings;
use cvb_common::events::{BundleEvent, EventBus};
use cvb_common::{Error, Result};
use futures::Stream;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tokio::task::JoinSet;

/// A clip that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedClip {
    pub locale: String,
    pub filename: String,
    pub message: String,
}

/// Result of one pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    pub rows: u64,
    /// Clips fetched during this run
    pub downloaded: u64,
    /// Clips already present locally, plus duplicate rows not fetched again
    pub skipped: u64,
    pub failed: Vec<FailedClip>,
    pub locales: BTreeMap<String, LocaleStats>,
    pub tsv_path: PathBuf,
}

/// Terminal state of one download task
struct FetchOutcome {
    locale: String,
    filename: String,
    local_path: PathBuf,
    result: Result<FetchStatus>,
}

/// Running totals while the loop is active
#[derive(Default)]
struct Tally {
    downloaded: u64,
    skipped: u64,
    failed: Vec<FailedClip>,
}

/// Streams rows into clips.tsv and the local clip layout
pub struct DownloadPipeline {
    layout: OutputLayout,
    fetcher: ClipFetcher,
    settings: PipelineSettings,
    events: EventBus,
}

impl DownloadPipeline {
    pub fn new(
        layout: OutputLayout,
        fetcher: ClipFetcher,
        settings: PipelineSettings,
        events: EventBus,
    ) -> Self {
        Self {
            layout,
            fetcher,
            settings,
            events,
        }
    }

    /// Consume `rows` to completion
    ///
    /// Returns once the source has ended and every download has reached a
    /// terminal state. A source error aborts the run.
    pub async fn run<S>(&self, rows: S) -> Result<PipelineReport>
    where
        S: Stream<Item = Result<ClipRow>> + Send + 'static,
    {
        let mut backpressure =
            BackpressureController::new(self.settings.high_watermark, self.settings.low_watermark)?;
        ensure_dir(self.layout.root()).await?;
        let mut tsv = TsvWriter::create(&self.layout.tsv_path())?;

        let mut source = RowSource::spawn(rows, self.settings.row_buffer);
        let control = source.control();
        let mut completion = CompletionCoordinator::new();
        let mut aggregator = RowAggregator::new();
        let mut downloads: JoinSet<FetchOutcome> = JoinSet::new();
        let mut tally = Tally::default();
        let mut in_flight_paths: HashSet<PathBuf> = HashSet::new();
        let mut source_open = true;

        tracing::info!(
            out_dir = %self.layout.root().display(),
            high_watermark = self.settings.high_watermark,
            low_watermark = self.settings.low_watermark,
            "Download pipeline started"
        );

        loop {
            tokio::select! {
                row = source.recv(), if source_open && !backpressure.is_paused() => {
                    match row {
                        Some(Ok(row)) => {
                            let sanitized = aggregator.consume(&row);
                            tsv.write(&sanitized)?;
                            if aggregator.progress_due() {
                                tracing::info!(rows = aggregator.rows(), "Rows processed");
                                self.events.emit_lossy(BundleEvent::RowsProcessed {
                                    rows: aggregator.rows(),
                                });
                            }

                            let local_path = self.layout.clip_path(&row.locale, &row.id);
                            if !in_flight_paths.insert(local_path.clone()) {
                                tracing::debug!(
                                    locale = %row.locale,
                                    filename = %sanitized.path,
                                    "Duplicate row while its clip is in flight, not fetching again"
                                );
                                tally.skipped += 1;
                                continue;
                            }

                            completion.fetch_started();
                            if backpressure.fetch_started() == Some(FlowSignal::Pause) {
                                self.signal_source(&control, FlowSignal::Pause, backpressure.in_flight());
                            }

                            let fetcher = self.fetcher.clone();
                            let filename = sanitized.path;
                            let locale = row.locale;
                            let remote_key = row.path;
                            downloads.spawn(async move {
                                let result = fetcher.fetch(&remote_key, &local_path).await;
                                FetchOutcome { locale, filename, local_path, result }
                            });
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, rows = aggregator.rows(), "Row source failed");
                            return Err(e);
                        }
                        None => {
                            source_open = false;
                            tracing::info!(
                                rows = aggregator.rows(),
                                in_flight = backpressure.in_flight(),
                                "Row source ended"
                            );
                            if completion.source_ended() {
                                break;
                            }
                        }
                    }
                }
                Some(joined) = downloads.join_next() => {
                    let outcome = joined
                        .map_err(|e| Error::Internal(format!("Download task failed: {}", e)))?;
                    in_flight_paths.remove(&outcome.local_path);
                    self.record_outcome(outcome, &mut tally);

                    if backpressure.fetch_finished() == Some(FlowSignal::Resume) {
                        self.signal_source(&control, FlowSignal::Resume, backpressure.in_flight());
                    }
                    if completion.fetch_finished() {
                        break;
                    }
                }
                else => {
                    // Paused with nothing in flight; unreachable while low_watermark >= 1
                    return Err(Error::Internal("download pipeline stalled".to_string()));
                }
            }
        }

        let tsv_path = tsv.finish()?;
        let rows = aggregator.rows();

        tracing::info!(
            rows,
            downloaded = tally.downloaded,
            skipped = tally.skipped,
            failed = tally.failed.len(),
            "Downloads complete"
        );
        self.events.emit_lossy(BundleEvent::DownloadsComplete {
            rows,
            downloaded: tally.downloaded + tally.skipped,
            failed: tally.failed.len() as u64,
        });

        Ok(PipelineReport {
            rows,
            downloaded: tally.downloaded,
            skipped: tally.skipped,
            failed: tally.failed,
            locales: aggregator.into_locales(),
            tsv_path,
        })
    }

    fn record_outcome(&self, outcome: FetchOutcome, tally: &mut Tally) {
        let FetchOutcome {
            locale,
            filename,
            result,
            ..
        } = outcome;

        match result {
            Ok(status) => {
                let (bytes, skipped) = match status {
                    FetchStatus::Downloaded(bytes) => {
                        tally.downloaded += 1;
                        (bytes, false)
                    }
                    FetchStatus::AlreadyPresent => {
                        tally.skipped += 1;
                        (0, true)
                    }
                };
                tracing::debug!(locale = %locale, filename = %filename, bytes, skipped, "Clip ready");
                self.events.emit_lossy(BundleEvent::ClipDownloaded {
                    locale,
                    filename,
                    bytes,
                    skipped,
                    downloaded_total: tally.downloaded + tally.skipped,
                });
            }
            Err(e) => {
                tracing::warn!(locale = %locale, filename = %filename, error = %e, "Clip download failed");
                self.events.emit_lossy(BundleEvent::ClipFailed {
                    locale: locale.clone(),
                    filename: filename.clone(),
                    message: e.to_string(),
                });
                tally.failed.push(FailedClip {
                    locale,
                    filename,
                    message: e.to_string(),
                });
            }
        }
    }

    fn signal_source(&self, control: &SourceControl, signal: FlowSignal, in_flight: usize) {
        match signal {
            FlowSignal::Pause => {
                if control.pause() {
                    tracing::debug!(in_flight, "Pausing row source");
                    self.events.emit_lossy(BundleEvent::SourcePaused { in_flight });
                }
            }
            FlowSignal::Resume => {
                if control.resume() {
                    tracing::debug!(in_flight, "Resuming row source");
                    self.events.emit_lossy(BundleEvent::SourceResumed { in_flight });
                }
            }
        }
    }
}
