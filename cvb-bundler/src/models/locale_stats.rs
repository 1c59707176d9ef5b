//! Per-locale aggregate built by the row aggregator

use super::ClipRow;
use std::collections::{BTreeMap, HashSet};

/// Category names tallied into `splits`; every other field is ignored
pub const SPLIT_CATEGORIES: [&str; 3] = ["accent", "age", "gender"];

/// category name → category value → clip count
pub type Splits = BTreeMap<String, BTreeMap<String, u64>>;

/// Clip count, category splits and distinct users for one locale
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocaleStats {
    pub clips: u64,
    pub splits: Splits,
    /// Raw client ids; only the cardinality ever leaves this struct
    users: HashSet<String>,
}

impl LocaleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one row
    pub fn record(&mut self, row: &ClipRow) {
        self.clips += 1;

        for category in SPLIT_CATEGORIES {
            let value = row.category(category).unwrap_or_default();
            *self
                .splits
                .entry(category.to_string())
                .or_default()
                .entry(value.to_string())
                .or_insert(0) += 1;
        }

        self.users.insert(row.client_id.clone());
    }

    /// Number of distinct raw client ids seen
    pub fn user_count(&self) -> u64 {
        self.users.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(client: &str, gender: &str) -> ClipRow {
        ClipRow {
            client_id: client.to_string(),
            gender: gender.to_string(),
            locale: "de".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_counts_clips_splits_and_users() {
        let mut stats = LocaleStats::new();
        stats.record(&row("a", "male"));
        stats.record(&row("a", "female"));
        stats.record(&row("b", "female"));

        assert_eq!(stats.clips, 3);
        assert_eq!(stats.user_count(), 2);
        assert_eq!(stats.splits["gender"]["female"], 2);
        assert_eq!(stats.splits["gender"]["male"], 1);
        // Empty category values are tallied under ""
        assert_eq!(stats.splits["age"][""], 3);
        assert_eq!(stats.splits.len(), SPLIT_CATEGORIES.len());
    }

    #[test]
    fn test_split_values_sum_to_clips() {
        let mut stats = LocaleStats::new();
        for (i, gender) in ["male", "female", "other", "male"].iter().enumerate() {
            stats.record(&row(&format!("u{}", i), gender));
        }
        for category in SPLIT_CATEGORIES {
            let total: u64 = stats.splits[category].values().sum();
            assert_eq!(total, stats.clips);
        }
    }
}
