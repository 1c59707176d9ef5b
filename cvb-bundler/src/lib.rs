//! cvb-bundler library
//!
//! Streams clip metadata rows from a database, anonymizes and aggregates
//! them, downloads every referenced clip into a per-locale layout, then
//! archives each locale and publishes aggregate statistics.

pub mod layout;
pub mod models;
pub mod pipeline;
pub mod release;
pub mod services;
pub mod source;
pub mod stats;
pub mod storage;
pub mod utils;

pub use layout::OutputLayout;
pub use pipeline::{DownloadPipeline, PipelineReport};
pub use release::{ReleaseRunner, ReleaseSummary};
