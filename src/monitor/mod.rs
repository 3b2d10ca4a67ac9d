//! Monitor Module
//!
//! Observes cache operations, keeps bounded rolling history, raises
//! threshold alerts and produces health, metrics and Prometheus reports.

mod memory;
mod metrics;
mod prometheus;

pub use memory::{FixedProbe, MemoryProbe, MemorySnapshot, SysinfoProbe};
pub use metrics::{
    average, category_breakdown, category_of, format_uptime, hour_key, hour_of_day_distribution,
    hourly_trends, percentile, rate, top_keys, CategoryStats, HourlyBucket, HourlyTrend, KeyCount,
    OperationKind, OperationRecord, Percentiles, ResponseTimes,
};
pub use prometheus::render as render_prometheus;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::{AlertThresholds, MonitorConfig};
use crate::layer::{CacheLayer, HealthCheck, LayerStats};

/// Rolling rates are not judged on fewer operations than this.
pub const MIN_ALERT_SAMPLES: usize = 10;

/// Alerts included in the health report.
const REPORT_ALERTS: usize = 10;

/// Keys listed in the metrics report.
const TOP_KEYS: usize = 10;

/// Hourly trend points in the metrics report.
const TREND_HOURS: usize = 24;

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowHitRate,
    HighErrorRate,
    HighMemoryUsage,
    SlowResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One threshold breach.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
    /// Observed value
    pub value: f64,
    /// Configured threshold
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(alert_type: AlertType, severity: Severity, value: f64, threshold: f64) -> Self {
        let message = match alert_type {
            AlertType::LowHitRate => {
                format!("Cache hit rate {:.2}% is below {:.2}%", value, threshold)
            }
            AlertType::HighErrorRate => {
                format!("Cache error rate {:.2}% is above {:.2}%", value, threshold)
            }
            AlertType::HighMemoryUsage => {
                format!("Cache memory usage {:.2}% is above {:.2}%", value, threshold)
            }
            AlertType::SlowResponse => {
                format!("Average response time {:.2}ms is above {:.2}ms", value, threshold)
            }
        };
        Self {
            alert_type,
            message,
            severity,
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Overall status, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

/// Grades the current rates against the thresholds.
///
/// `hit_rate` is `None` before any read has happened. Critical means the
/// error rate reached twice its threshold; degraded means the hit rate is
/// 20 points under its floor or responses take twice the allowed time.
pub fn determine_status(
    thresholds: &AlertThresholds,
    hit_rate: Option<f64>,
    error_rate: f64,
    avg_response_ms: f64,
) -> MonitorStatus {
    let hit_below = |margin: f64| hit_rate.map(|h| h < thresholds.hit_rate - margin).unwrap_or(false);

    if error_rate > 0.0 && error_rate >= thresholds.error_rate * 2.0 {
        MonitorStatus::Critical
    } else if hit_below(20.0) || avg_response_ms > thresholds.response_time_ms * 2.0 {
        MonitorStatus::Degraded
    } else if error_rate > thresholds.error_rate
        || hit_below(0.0)
        || avg_response_ms > thresholds.response_time_ms
    {
        MonitorStatus::Warning
    } else {
        MonitorStatus::Healthy
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Uptime {
    pub seconds: u64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Performance {
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
    pub operations_per_second: f64,
    pub recent_operations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: MonitorStatus,
    pub uptime: Uptime,
    pub cache: LayerStats,
    pub performance: Performance,
    pub memory: MemorySnapshot,
    pub alerts: Vec<Alert>,
    pub health_check: HealthCheck,
    pub timestamp: DateTime<Utc>,
}

/// Summary of the operations inside one time window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    pub operations: usize,
    pub hit_rate: f64,
    pub error_rate: f64,
    pub response_times: ResponseTimes,
    pub categories: BTreeMap<String, CategoryStats>,
    pub top_keys: Vec<KeyCount>,
}

impl WindowSummary {
    fn from_ops(ops: &[&OperationRecord]) -> Self {
        let rates = RollingRates::from_ops(ops.iter().copied());
        Self {
            operations: ops.len(),
            hit_rate: rates.hit_rate.unwrap_or(0.0),
            error_rate: rates.error_rate,
            response_times: ResponseTimes::from_ops(ops.iter().copied()),
            categories: category_breakdown(ops.iter().copied()),
            top_keys: top_keys(ops.iter().copied(), TOP_KEYS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub last_hour: WindowSummary,
    pub last_day: WindowSummary,
    /// Operations in the last day by UTC hour of day
    pub time_distribution: BTreeMap<u32, u64>,
    pub hourly_trends: Vec<HourlyTrend>,
    pub cache: LayerStats,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Rolling Rates
// ============================================================================

/// Rates over a run of operations.
#[derive(Debug, Clone, Copy, Default)]
struct RollingRates {
    operations: usize,
    /// Hit percentage among reads, `None` without reads
    hit_rate: Option<f64>,
    error_rate: f64,
    avg_response_ms: f64,
}

impl RollingRates {
    fn from_ops<'a>(ops: impl IntoIterator<Item = &'a OperationRecord>) -> Self {
        let (mut operations, mut reads, mut hits, mut errors, mut total_us) = (0usize, 0u64, 0u64, 0u64, 0u64);
        for op in ops {
            operations += 1;
            if op.kind == OperationKind::Get {
                reads += 1;
                if op.hit {
                    hits += 1;
                }
            }
            if op.error.is_some() {
                errors += 1;
            }
            total_us += op.duration_us;
        }
        Self {
            operations,
            hit_rate: (reads > 0).then(|| rate(hits, reads)),
            error_rate: rate(errors, operations as u64),
            avg_response_ms: total_us as f64 / operations.max(1) as f64 / 1000.0,
        }
    }
}

// ============================================================================
// Cache Monitor
// ============================================================================

/// Operation observer for a cache layer.
///
/// All state sits behind short-lived locks; recording never awaits and
/// never touches the network.
pub struct CacheMonitor {
    cache: Arc<dyn CacheLayer>,
    config: MonitorConfig,
    memory: Arc<dyn MemoryProbe>,
    started_at: Instant,
    operations: RwLock<VecDeque<OperationRecord>>,
    hourly: RwLock<BTreeMap<String, HourlyBucket>>,
    alerts: RwLock<VecDeque<Alert>>,
    alert_tx: broadcast::Sender<Alert>,
}

impl CacheMonitor {
    pub fn new(
        cache: Arc<dyn CacheLayer>,
        config: MonitorConfig,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        let (alert_tx, _) = broadcast::channel(config.alert_capacity.max(1));
        Self {
            cache,
            operations: RwLock::new(VecDeque::with_capacity(config.buffer_capacity)),
            hourly: RwLock::new(BTreeMap::new()),
            alerts: RwLock::new(VecDeque::with_capacity(config.alert_capacity)),
            config,
            memory,
            started_at: Instant::now(),
            alert_tx,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Receives every alert as it is raised.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alert_tx.subscribe()
    }

    // == Recording ==
    /// Records one operation timestamped now.
    pub fn record_operation(
        &self,
        kind: OperationKind,
        key: &str,
        hit: bool,
        duration_us: u64,
        error: Option<String>,
    ) {
        self.record(OperationRecord {
            timestamp: Utc::now(),
            kind,
            key: key.to_string(),
            hit,
            duration_us,
            error,
        });
    }

    /// Appends a record to the ring buffer and hourly bucket, then checks thresholds.
    pub fn record(&self, op: OperationRecord) {
        if !self.config.enabled {
            return;
        }

        {
            let mut hourly = self.hourly.write();
            hourly.entry(hour_key(&op.timestamp)).or_default().record(&op);
            while hourly.len() > self.config.hourly_buckets {
                hourly.pop_first();
            }
        }

        {
            let mut operations = self.operations.write();
            if operations.len() >= self.config.buffer_capacity {
                operations.pop_front();
            }
            operations.push_back(op);
        }

        self.check_alerts();
    }

    fn rolling_rates(&self) -> RollingRates {
        let operations = self.operations.read();
        let skip = operations.len().saturating_sub(self.config.rolling_window);
        RollingRates::from_ops(operations.iter().skip(skip))
    }

    fn check_alerts(&self) {
        let rates = self.rolling_rates();
        if rates.operations < MIN_ALERT_SAMPLES.min(self.config.rolling_window) {
            return;
        }
        let thresholds = self.config.thresholds;

        if let Some(hit_rate) = rates.hit_rate {
            if hit_rate < thresholds.hit_rate {
                self.raise(Alert::new(
                    AlertType::LowHitRate,
                    Severity::Warning,
                    hit_rate,
                    thresholds.hit_rate,
                ));
            }
        }

        if rates.error_rate > thresholds.error_rate {
            self.raise(Alert::new(
                AlertType::HighErrorRate,
                Severity::Error,
                rates.error_rate,
                thresholds.error_rate,
            ));
        }

        if rates.avg_response_ms > thresholds.response_time_ms {
            self.raise(Alert::new(
                AlertType::SlowResponse,
                Severity::Warning,
                rates.avg_response_ms,
                thresholds.response_time_ms,
            ));
        }

        let memory_utilization = self.cache.stats().memory_utilization();
        if memory_utilization > thresholds.memory_usage {
            self.raise(Alert::new(
                AlertType::HighMemoryUsage,
                Severity::Warning,
                memory_utilization,
                thresholds.memory_usage,
            ));
        }
    }

    fn raise(&self, alert: Alert) {
        match alert.severity {
            Severity::Error => error!(alert = ?alert.alert_type, "{}", alert.message),
            Severity::Warning => warn!(alert = ?alert.alert_type, "{}", alert.message),
        }

        {
            let mut alerts = self.alerts.write();
            if alerts.len() >= self.config.alert_capacity {
                alerts.pop_front();
            }
            alerts.push_back(alert.clone());
        }

        // No subscribers is fine
        let _ = self.alert_tx.send(alert);
    }

    // == Queries ==
    /// All retained alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().iter().cloned().collect()
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read();
        let skip = alerts.len().saturating_sub(limit);
        alerts.iter().skip(skip).cloned().collect()
    }

    /// Number of operations held in the ring buffer.
    pub fn recorded_operations(&self) -> usize {
        self.operations.read().len()
    }

    /// Operations in the last 60 seconds, per second.
    pub fn ops_per_second(&self) -> f64 {
        let cutoff = Utc::now() - ChronoDuration::seconds(60);
        let recent = self
            .operations
            .read()
            .iter()
            .rev()
            .take_while(|op| op.timestamp >= cutoff)
            .count();
        recent as f64 / 60.0
    }

    pub fn uptime(&self) -> Uptime {
        let seconds = self.started_at.elapsed().as_secs();
        Uptime {
            seconds,
            formatted: format_uptime(seconds),
        }
    }

    /// Status from cumulative hit rate and rolling error rate and latency.
    pub fn status(&self) -> MonitorStatus {
        let rates = self.rolling_rates();
        let stats = self.cache.stats();
        determine_status(
            &self.config.thresholds,
            (stats.total_reads() > 0).then(|| stats.hit_rate()),
            rates.error_rate,
            rates.avg_response_ms,
        )
    }

    pub async fn health_report(&self) -> HealthReport {
        let rates = self.rolling_rates();
        let stats = self.cache.stats();
        let status = determine_status(
            &self.config.thresholds,
            (stats.total_reads() > 0).then(|| stats.hit_rate()),
            rates.error_rate,
            rates.avg_response_ms,
        );

        HealthReport {
            status,
            uptime: self.uptime(),
            cache: stats,
            performance: Performance {
                avg_response_time_ms: rates.avg_response_ms,
                error_rate: rates.error_rate,
                operations_per_second: self.ops_per_second(),
                recent_operations: rates.operations,
            },
            memory: self.memory.snapshot(),
            alerts: self.recent_alerts(REPORT_ALERTS),
            health_check: self.cache.health_check().await,
            timestamp: Utc::now(),
        }
    }

    pub fn metrics_report(&self) -> MetricsReport {
        let now = Utc::now();
        let hour_ago = now - ChronoDuration::hours(1);
        let day_ago = now - ChronoDuration::days(1);

        // Snapshot under the lock, aggregate outside it
        let day: Vec<OperationRecord> = self
            .operations
            .read()
            .iter()
            .filter(|op| op.timestamp >= day_ago)
            .cloned()
            .collect();
        let trends = hourly_trends(&self.hourly.read(), TREND_HOURS);

        let day_refs: Vec<&OperationRecord> = day.iter().collect();
        let hour_refs: Vec<&OperationRecord> = day
            .iter()
            .filter(|op| op.timestamp >= hour_ago)
            .collect();

        MetricsReport {
            last_hour: WindowSummary::from_ops(&hour_refs),
            last_day: WindowSummary::from_ops(&day_refs),
            time_distribution: hour_of_day_distribution(day_refs.iter().copied()),
            hourly_trends: trends,
            cache: self.cache.stats(),
            generated_at: now,
        }
    }

    /// Prometheus text exposition of the cache gauges and counters.
    pub fn prometheus(&self) -> String {
        render_prometheus(&self.cache.stats(), self.ops_per_second())
    }

    /// One-line status summary.
    pub fn status_line(&self) -> String {
        let stats = self.cache.stats();
        format!(
            "cache {:?}: hit rate {:.1}%, {} entries, {:.1}% memory, {:.2} ops/s, up {}",
            self.status(),
            stats.hit_rate(),
            stats.size(),
            stats.memory_utilization(),
            self.ops_per_second(),
            self.uptime().formatted,
        )
    }

    /// Logs a one-line status when healthy, the full report otherwise.
    pub async fn log_report(&self) {
        let report = self.health_report().await;
        if report.status == MonitorStatus::Healthy {
            info!("{}", self.status_line());
        } else {
            match serde_json::to_string(&report) {
                Ok(json) => warn!(status = ?report.status, report = %json, "cache health report"),
                Err(e) => warn!(status = ?report.status, error = %e, "cache health report"),
            }
        }
    }

    /// Drops recorded operations, hourly buckets and alerts.
    pub fn reset(&self) {
        self.operations.write().clear();
        self.hourly.write().clear();
        self.alerts.write().clear();
        info!("Cache monitor reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use std::time::Duration;

    fn monitor_with(config: MonitorConfig) -> (LocalCache, CacheMonitor) {
        let cache = LocalCache::with_limits(100, 1024 * 1024, Duration::from_secs(60));
        let monitor = CacheMonitor::new(Arc::new(cache.clone()), config, Arc::new(FixedProbe(0.1)));
        (cache, monitor)
    }

    fn monitor() -> (LocalCache, CacheMonitor) {
        monitor_with(MonitorConfig::default())
    }

    #[test]
    fn test_determine_status_levels() {
        let t = AlertThresholds::default();
        assert_eq!(determine_status(&t, Some(95.0), 0.0, 1.0), MonitorStatus::Healthy);
        assert_eq!(determine_status(&t, None, 0.0, 1.0), MonitorStatus::Healthy);
        assert_eq!(determine_status(&t, Some(65.0), 0.0, 1.0), MonitorStatus::Warning);
        assert_eq!(determine_status(&t, Some(40.0), 0.0, 1.0), MonitorStatus::Degraded);
        assert_eq!(determine_status(&t, Some(95.0), 0.0, 1200.0), MonitorStatus::Degraded);
        assert_eq!(determine_status(&t, Some(95.0), 6.0, 1.0), MonitorStatus::Warning);
        assert_eq!(determine_status(&t, Some(95.0), 10.0, 1.0), MonitorStatus::Critical);
    }

    #[test]
    fn test_status_monotonic_in_error_rate() {
        let t = AlertThresholds::default();
        let mut previous = MonitorStatus::Healthy;
        for step in 0..=100 {
            let status = determine_status(&t, Some(80.0), step as f64, 10.0);
            assert!(status >= previous);
            previous = status;
        }
        assert_eq!(previous, MonitorStatus::Critical);
    }

    #[test]
    fn test_ring_buffer_is_bounded() {
        let (_, monitor) = monitor_with(MonitorConfig {
            buffer_capacity: 5,
            ..MonitorConfig::default()
        });
        for i in 0..12 {
            monitor.record_operation(OperationKind::Set, &format!("k:{}", i), false, 10, None);
        }
        assert_eq!(monitor.recorded_operations(), 5);
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let (_, monitor) = monitor_with(MonitorConfig {
            enabled: false,
            ..MonitorConfig::default()
        });
        monitor.record_operation(OperationKind::Get, "k", true, 10, None);
        assert_eq!(monitor.recorded_operations(), 0);
    }

    #[test]
    fn test_low_hit_rate_alert() {
        let (_, monitor) = monitor();
        let mut alerts = monitor.subscribe_alerts();
        for i in 0..MIN_ALERT_SAMPLES {
            monitor.record_operation(OperationKind::Get, &format!("user:{}", i), false, 10, None);
        }

        let raised = monitor.alerts();
        assert!(!raised.is_empty());
        assert!(raised.iter().all(|a| a.alert_type == AlertType::LowHitRate));
        assert_eq!(raised[0].severity, Severity::Warning);
        assert_eq!(alerts.try_recv().unwrap().alert_type, AlertType::LowHitRate);
    }

    #[test]
    fn test_no_alert_below_sample_floor() {
        let (_, monitor) = monitor();
        for _ in 0..MIN_ALERT_SAMPLES - 1 {
            monitor.record_operation(OperationKind::Get, "k", false, 10, Some("boom".into()));
        }
        assert!(monitor.alerts().is_empty());
    }

    #[test]
    fn test_error_rate_alert_is_error_severity() {
        let (_, monitor) = monitor();
        for i in 0..20 {
            let error = (i % 2 == 0).then(|| "remote down".to_string());
            monitor.record_operation(OperationKind::Set, "k", false, 10, error);
        }
        let alert = monitor
            .alerts()
            .into_iter()
            .find(|a| a.alert_type == AlertType::HighErrorRate)
            .unwrap();
        assert_eq!(alert.severity, Severity::Error);
    }

    #[test]
    fn test_slow_response_alert() {
        let (_, monitor) = monitor();
        for _ in 0..MIN_ALERT_SAMPLES {
            monitor.record_operation(OperationKind::Set, "k", false, 800_000, None);
        }
        assert!(monitor
            .alerts()
            .iter()
            .any(|a| a.alert_type == AlertType::SlowResponse));
    }

    #[test]
    fn test_alert_list_is_bounded() {
        let (_, monitor) = monitor_with(MonitorConfig {
            alert_capacity: 3,
            ..MonitorConfig::default()
        });
        for _ in 0..30 {
            monitor.record_operation(OperationKind::Get, "k", false, 10, None);
        }
        assert_eq!(monitor.alerts().len(), 3);
        assert_eq!(monitor.recent_alerts(2).len(), 2);
    }

    #[test]
    fn test_metrics_report_windows() {
        let (_, monitor) = monitor();
        let old = OperationRecord {
            timestamp: Utc::now() - ChronoDuration::hours(3),
            kind: OperationKind::Get,
            key: "menu:all".to_string(),
            hit: true,
            duration_us: 100,
            error: None,
        };
        monitor.record(old);
        monitor.record_operation(OperationKind::Get, "order:1", true, 200, None);
        monitor.record_operation(OperationKind::Get, "order:1", false, 400, None);

        let report = monitor.metrics_report();
        assert_eq!(report.last_hour.operations, 2);
        assert_eq!(report.last_day.operations, 3);
        assert_eq!(report.last_hour.hit_rate, 50.0);
        assert_eq!(report.last_hour.top_keys[0].key, "order:1");
        assert_eq!(report.last_hour.categories["order"].count, 2);
        assert!(!report.last_hour.categories.contains_key("menu"));
        assert_eq!(report.last_day.response_times.max_us, Some(400));
        assert_eq!(report.time_distribution.values().sum::<u64>(), 3);
        assert!(!report.hourly_trends.is_empty());
    }

    #[tokio::test]
    async fn test_health_report_fresh_cache_is_healthy() {
        let (_, monitor) = monitor();
        let report = monitor.health_report().await;
        assert_eq!(report.status, MonitorStatus::Healthy);
        assert_eq!(report.performance.recent_operations, 0);
        assert!(report.alerts.is_empty());
        assert_eq!(report.memory.pressure, 0.1);
    }

    #[tokio::test]
    async fn test_health_report_uses_cache_hit_rate() {
        let (cache, monitor) = monitor();
        for i in 0..10 {
            cache.get(&format!("missing:{}", i));
        }
        let report = monitor.health_report().await;
        assert_eq!(report.status, MonitorStatus::Degraded);
    }

    #[test]
    fn test_ops_per_second_and_reset() {
        let (_, monitor) = monitor();
        for _ in 0..60 {
            monitor.record_operation(OperationKind::Set, "k", false, 10, None);
        }
        assert_eq!(monitor.ops_per_second(), 1.0);

        monitor.reset();
        assert_eq!(monitor.recorded_operations(), 0);
        assert!(monitor.alerts().is_empty());
        assert_eq!(monitor.ops_per_second(), 0.0);
    }

    #[test]
    fn test_prometheus_output() {
        let (cache, monitor) = monitor();
        cache.set("a", serde_json::json!(1), None);
        let text = monitor.prometheus();
        assert!(text.contains("cache_size_total 1\n"));
    }
}
