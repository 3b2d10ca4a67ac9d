//! Monitor Metrics Module
//!
//! Operation records, hourly aggregation and the pure report math
//! (percentiles, category breakdown, top keys, trends).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

// ============================================================================
// Operation Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    DeleteMany,
    Has,
    InvalidatePattern,
    Clear,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
            OperationKind::DeleteMany => "delete_many",
            OperationKind::Has => "has",
            OperationKind::InvalidatePattern => "invalidate_pattern",
            OperationKind::Clear => "clear",
        }
    }
}

/// One observed cache operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: OperationKind,
    pub key: String,
    pub hit: bool,
    pub duration_us: u64,
    pub error: Option<String>,
}

/// Per-hour totals.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HourlyBucket {
    pub operations: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_duration_us: u64,
}

impl HourlyBucket {
    pub fn record(&mut self, op: &OperationRecord) {
        self.operations += 1;
        if op.hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        if op.error.is_some() {
            self.errors += 1;
        }
        self.total_duration_us += op.duration_us;
    }
}

/// Bucket key for a timestamp: `YYYY-MM-DDTHH` (UTC).
pub fn hour_key(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

/// First colon-delimited key segment.
pub fn category_of(key: &str) -> &str {
    match key.split(':').next() {
        Some(category) if !category.is_empty() => category,
        _ => "unknown",
    }
}

// ============================================================================
// Percentiles
// ============================================================================

/// Nearest-rank percentile over ascending samples.
///
/// Index is `ceil(p / 100 * n) - 1`, clamped to `[0, n - 1]`.
pub fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    Some(sorted[index])
}

/// Response-time percentiles in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    pub p50: u64,
    pub p75: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

impl Percentiles {
    /// Computes percentiles; `None` for an empty sample set.
    pub fn from_samples(mut samples: Vec<u64>) -> Option<Self> {
        samples.sort_unstable();
        Some(Self {
            p50: percentile(&samples, 50.0)?,
            p75: percentile(&samples, 75.0)?,
            p90: percentile(&samples, 90.0)?,
            p95: percentile(&samples, 95.0)?,
            p99: percentile(&samples, 99.0)?,
        })
    }
}

// ============================================================================
// Report Sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseTimes {
    pub percentiles: Option<Percentiles>,
    pub avg_us: f64,
    pub min_us: Option<u64>,
    pub max_us: Option<u64>,
}

impl ResponseTimes {
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a OperationRecord>) -> Self {
        let samples: Vec<u64> = ops.into_iter().map(|op| op.duration_us).collect();
        Self {
            avg_us: average(&samples),
            min_us: samples.iter().copied().min(),
            max_us: samples.iter().copied().max(),
            percentiles: Percentiles::from_samples(samples),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryStats {
    pub count: u64,
    pub hits: u64,
    pub hit_rate: f64,
    pub avg_duration_us: f64,
    #[serde(skip)]
    total_duration_us: u64,
}

/// Per-category counts keyed by the first key segment.
pub fn category_breakdown<'a>(
    ops: impl IntoIterator<Item = &'a OperationRecord>,
) -> BTreeMap<String, CategoryStats> {
    let mut categories: BTreeMap<String, CategoryStats> = BTreeMap::new();
    for op in ops {
        let stats = categories.entry(category_of(&op.key).to_string()).or_default();
        stats.count += 1;
        if op.hit {
            stats.hits += 1;
        }
        stats.total_duration_us += op.duration_us;
    }
    for stats in categories.values_mut() {
        stats.hit_rate = rate(stats.hits, stats.count);
        stats.avg_duration_us = stats.total_duration_us as f64 / stats.count.max(1) as f64;
    }
    categories
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

/// Most frequently accessed keys, ties broken by key.
pub fn top_keys<'a>(ops: impl IntoIterator<Item = &'a OperationRecord>, limit: usize) -> Vec<KeyCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for op in ops {
        *counts.entry(op.key.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<KeyCount> = counts
        .into_iter()
        .map(|(key, count)| KeyCount {
            key: key.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(limit);
    ranked
}

/// Operation counts by UTC hour of day.
pub fn hour_of_day_distribution<'a>(
    ops: impl IntoIterator<Item = &'a OperationRecord>,
) -> BTreeMap<u32, u64> {
    let mut distribution = BTreeMap::new();
    for op in ops {
        *distribution.entry(op.timestamp.hour()).or_default() += 1;
    }
    distribution
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyTrend {
    pub hour: String,
    pub operations: u64,
    pub hit_rate: f64,
    pub avg_duration_us: f64,
    pub error_rate: f64,
}

/// Trends for the most recent `limit` hourly buckets, oldest first.
pub fn hourly_trends(buckets: &BTreeMap<String, HourlyBucket>, limit: usize) -> Vec<HourlyTrend> {
    let skip = buckets.len().saturating_sub(limit);
    buckets
        .iter()
        .skip(skip)
        .map(|(hour, bucket)| HourlyTrend {
            hour: hour.clone(),
            operations: bucket.operations,
            hit_rate: rate(bucket.hits, bucket.operations),
            avg_duration_us: bucket.total_duration_us as f64 / bucket.operations.max(1) as f64,
            error_rate: rate(bucket.errors, bucket.operations),
        })
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

/// `part / total` as a percentage, 0 when total is 0.
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn average(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }
}

/// `1d 2h 3m`, `2h 3m 4s`, `3m 4s` or `4s`.
pub fn format_uptime(seconds: u64) -> String {
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
