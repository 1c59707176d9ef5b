//! Bundler services
//!
//! - ClipFetcher: download one clip to its local path
//! - TsvWriter: write clips.tsv
//! - external_tools: duration tool, corpus splitter, bucket counts
//! - Archiver: stream locale archives to storage

pub mod archiver;
pub mod clip_fetcher;
pub mod external_tools;
pub mod tsv_writer;

pub use archiver::{archive_key, Archiver, UploadFailure, UploadReport};
pub use clip_fetcher::{ClipFetcher, FetchStatus};
pub use external_tools::{count_buckets, parse_duration_output, run_corpus_splitter, DurationSummarizer};
pub use tsv_writer::TsvWriter;
