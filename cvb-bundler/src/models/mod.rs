//! Data models for the bundler
//!
//! - ClipRow: one row read from the source query
//! - SanitizedRow: the only row representation that is persisted
//! - LocaleStats: per-locale aggregate built while rows stream in

pub mod clip_row;
pub mod locale_stats;

pub use clip_row::{ClipRow, SanitizedRow, TSV_COLUMNS};
pub use locale_stats::{LocaleStats, SPLIT_CATEGORIES};
