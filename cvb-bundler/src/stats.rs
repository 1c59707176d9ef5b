//! Aggregate statistics
//!
//! Per-locale facts arrive from several places (row aggregation, the
//! duration tool, the splitter's bucket files, archive sizes) as
//! `LocalePartial`s. They are merged field by field, then
//! `calculate_aggregate_stats` derives the published stats.json document.

use crate::models::locale_stats::Splits;
use crate::models::LocaleStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket whose line count gives the validated clip count
pub const VALIDATED_BUCKET: &str = "validated";

/// Digits kept by hour conversions
pub const HOUR_DIGITS: u32 = 2;

/// locale → partial facts
pub type Partials = BTreeMap<String, LocalePartial>;

/// Facts about one locale from a single source; absent fields are unknown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalePartial {
    pub clips: Option<u64>,
    pub splits: Option<Splits>,
    pub users: Option<u64>,
    /// Total clip duration in milliseconds
    pub duration: Option<f64>,
    pub buckets: Option<BTreeMap<String, u64>>,
    /// Uploaded archive size in bytes
    pub size: Option<u64>,
}

impl LocalePartial {
    pub fn with_duration(duration_ms: f64) -> Self {
        Self {
            duration: Some(duration_ms),
            ..Default::default()
        }
    }

    pub fn with_buckets(buckets: BTreeMap<String, u64>) -> Self {
        Self {
            buckets: Some(buckets),
            ..Default::default()
        }
    }

    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    /// Overlay `later`: each field it carries replaces ours
    pub fn merge(&mut self, later: LocalePartial) {
        if later.clips.is_some() {
            self.clips = later.clips;
        }
        if later.splits.is_some() {
            self.splits = later.splits;
        }
        if later.users.is_some() {
            self.users = later.users;
        }
        if later.duration.is_some() {
            self.duration = later.duration;
        }
        if later.buckets.is_some() {
            self.buckets = later.buckets;
        }
        if later.size.is_some() {
            self.size = later.size;
        }
    }
}

impl From<&LocaleStats> for LocalePartial {
    fn from(stats: &LocaleStats) -> Self {
        Self {
            clips: Some(stats.clips),
            splits: Some(stats.splits.clone()),
            users: Some(stats.user_count()),
            ..Default::default()
        }
    }
}

/// Partials for every locale seen by the row aggregator
pub fn partials_from_locales(locales: &BTreeMap<String, LocaleStats>) -> Partials {
    locales
        .iter()
        .map(|(locale, stats)| (locale.clone(), LocalePartial::from(stats)))
        .collect()
}

/// Merge sources in order; later sources win on overlapping fields
pub fn merge_partials(sources: impl IntoIterator<Item = Partials>) -> Partials {
    let mut merged = Partials::new();
    for source in sources {
        for (locale, partial) in source {
            merged.entry(locale).or_default().merge(partial);
        }
    }
    merged
}

/// Time unit of a value converted to hours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    fn per_hour(self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 3_600_000.0,
            TimeUnit::Seconds => 3_600.0,
        }
    }
}

/// Convert to hours, truncating (never rounding up) to `digits` decimals
pub fn units_to_hours(value: f64, unit: TimeUnit, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value / unit.per_hour() * scale).floor() / scale
}

/// Round half up, matching `Math.round`
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Published figures for one locale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleSummary {
    pub clips: u64,
    pub splits: Splits,
    pub users: u64,
    pub duration: f64,
    pub buckets: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub avg_duration_secs: f64,
    pub valid_duration_secs: f64,
    pub total_hrs: f64,
    pub valid_hrs: f64,
}

/// The stats.json document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    #[serde(rename = "bundleURLTemplate")]
    pub bundle_url_template: String,
    /// Milliseconds, floored
    pub total_duration: u64,
    /// Seconds, floored
    pub total_valid_duration_secs: u64,
    pub total_hrs: f64,
    pub total_valid_hrs: f64,
    pub locales: BTreeMap<String, LocaleSummary>,
}

fn summarize(partial: &LocalePartial) -> LocaleSummary {
    let clips = partial.clips.unwrap_or(0);
    let duration = partial.duration.unwrap_or(0.0);
    let buckets = partial.buckets.clone().unwrap_or_default();
    let validated = buckets.get(VALIDATED_BUCKET).copied().unwrap_or(0);

    let (avg_duration_secs, valid_duration_secs) = if clips == 0 {
        (0.0, 0.0)
    } else {
        let per_clip = duration / clips as f64;
        (
            round_half_up(per_clip) / 1000.0,
            round_half_up(per_clip * validated as f64) / 1000.0,
        )
    };

    LocaleSummary {
        clips,
        splits: partial.splits.clone().unwrap_or_default(),
        users: partial.users.unwrap_or(0),
        duration,
        buckets,
        size: partial.size,
        avg_duration_secs,
        valid_duration_secs,
        total_hrs: units_to_hours(duration, TimeUnit::Milliseconds, HOUR_DIGITS),
        valid_hrs: units_to_hours(valid_duration_secs, TimeUnit::Seconds, HOUR_DIGITS),
    }
}

/// Derive the published document from merged partials
pub fn calculate_aggregate_stats(partials: &Partials, bundle_url_template: &str) -> AggregateStats {
    let locales: BTreeMap<String, LocaleSummary> = partials
        .iter()
        .map(|(locale, partial)| (locale.clone(), summarize(partial)))
        .collect();

    let total_duration = locales.values().map(|l| l.duration).sum::<f64>().floor();
    let total_valid = locales
        .values()
        .map(|l| l.valid_duration_secs)
        .sum::<f64>()
        .floor();

    AggregateStats {
        bundle_url_template: bundle_url_template.to_string(),
        total_duration: total_duration as u64,
        total_valid_duration_secs: total_valid as u64,
        total_hrs: units_to_hours(total_duration, TimeUnit::Milliseconds, HOUR_DIGITS),
        total_valid_hrs: units_to_hours(total_valid, TimeUnit::Seconds, HOUR_DIGITS),
        locales,
    }
}
