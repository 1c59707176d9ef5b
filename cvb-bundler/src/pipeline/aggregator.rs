//! Row aggregator
//!
//! Consumes every row exactly once, in arrival order: one LocaleStats update
//! and one SanitizedRow per row. The stats map lives here for the whole run
//! and is handed to the stats calculator by value at the end.

use crate::models::{ClipRow, LocaleStats, SanitizedRow};
use std::collections::BTreeMap;

/// Rows between progress reports
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Per-locale aggregation state for one run
#[derive(Debug, Default)]
pub struct RowAggregator {
    locales: BTreeMap<String, LocaleStats>,
    rows: u64,
}

impl RowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row and return its persisted projection
    pub fn consume(&mut self, row: &ClipRow) -> SanitizedRow {
        self.locales
            .entry(row.locale.clone())
            .or_default()
            .record(row);
        self.rows += 1;
        row.sanitize()
    }

    /// Rows consumed so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// True when the row count just crossed a reporting boundary
    pub fn progress_due(&self) -> bool {
        self.rows > 0 && self.rows % PROGRESS_INTERVAL == 0
    }

    pub fn locales(&self) -> &BTreeMap<String, LocaleStats> {
        &self.locales
    }

    pub fn into_locales(self) -> BTreeMap<String, LocaleStats> {
        self.locales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvb_common::hashing::hash_client_id;

    fn row(id: usize, locale: &str, client: &str) -> ClipRow {
        ClipRow {
            id: id.to_string(),
            client_id: client.to_string(),
            locale: locale.to_string(),
            sentence: "text".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clip_totals_match_row_count() {
        let mut aggregator = RowAggregator::new();
        let locales = ["en", "fr", "de", "en", "en", "fr"];
        for (i, locale) in locales.iter().enumerate() {
            aggregator.consume(&row(i, locale, &format!("c{}", i % 2)));
        }

        let total: u64 = aggregator.locales().values().map(|s| s.clips).sum();
        assert_eq!(total, aggregator.rows());
        assert_eq!(aggregator.rows(), locales.len() as u64);
        assert_eq!(aggregator.locales()["en"].clips, 3);
    }

    #[test]
    fn test_users_counted_per_locale_on_raw_id() {
        let mut aggregator = RowAggregator::new();
        aggregator.consume(&row(1, "en", "same"));
        aggregator.consume(&row(2, "en", "same"));
        aggregator.consume(&row(3, "fr", "same"));

        assert_eq!(aggregator.locales()["en"].user_count(), 1);
        assert_eq!(aggregator.locales()["fr"].user_count(), 1);
    }

    #[test]
    fn test_sanitized_row_has_no_raw_id() {
        let mut aggregator = RowAggregator::new();
        let sanitized = aggregator.consume(&row(7, "en", "raw-client-id"));
        assert_eq!(sanitized.client_id, hash_client_id("raw-client-id"));
        assert_eq!(sanitized.path, "common_voice_en_7.mp3");
    }

    #[test]
    fn test_progress_due_every_interval() {
        let mut aggregator = RowAggregator::new();
        assert!(!aggregator.progress_due());
        for i in 0..PROGRESS_INTERVAL as usize {
            aggregator.consume(&row(i, "en", "c"));
        }
        assert!(aggregator.progress_due());
        aggregator.consume(&row(0, "en", "c"));
        assert!(!aggregator.progress_due());
    }
}
