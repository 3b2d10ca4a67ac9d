//! Configuration Module
//!
//! Handles loading and managing engine configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

// == Strategy ==
/// How the tiers are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Tier 1 only
    Local,
    /// Small, short-lived tier 1 in front of Redis
    Redis,
    /// Full tier 1 plus Redis
    Hybrid,
}

impl FromStr for CacheStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(CacheStrategy::Local),
            "redis" => Ok(CacheStrategy::Redis),
            "hybrid" => Ok(CacheStrategy::Hybrid),
            other => Err(format!("unknown cache strategy '{}'", other)),
        }
    }
}

// == Local Tier ==
/// Tier-1 limits and background sweep cadence.
#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Approximate byte ceiling for stored values
    pub max_memory_bytes: usize,
    /// TTL applied when the caller passes none
    pub default_ttl: Duration,
    /// Interval of the expiry sweep
    pub cleanup_interval: Duration,
    /// Interval of the process memory-pressure check
    pub memory_check_interval: Duration,
    /// Memory pressure ratio (0..1) above which tier 1 sheds entries
    pub memory_high_water: f64,
    /// Fraction of tier-1 usage shed on pressure
    pub memory_pressure_fraction: f64,
    /// Process memory budget the pressure ratio is measured against.
    /// `None` measures against total system memory.
    pub memory_budget_bytes: Option<u64>,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_memory_bytes: 100 * 1024 * 1024,
            default_ttl: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(1),
            memory_check_interval: Duration::from_secs(30),
            memory_high_water: 0.85,
            memory_pressure_fraction: 0.20,
            memory_budget_bytes: None,
        }
    }
}

// == Remote Tier ==
/// Tier-2 connection and write settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL; `None` runs tier-1 only
    pub url: Option<String>,
    /// Connection pool size
    pub pool_size: usize,
    /// Per-call budget for every remote operation
    pub timeout_ms: u64,
    /// TTL written to tier 2 when the caller passes none
    pub ttl: Duration,
    /// Namespace prepended to every remote key
    pub key_prefix: String,
    /// Gzip payloads above `compression_threshold`
    pub enable_compression: bool,
    /// Payload size (bytes) above which compression kicks in
    pub compression_threshold: usize,
    /// SCAN COUNT hint per round-trip
    pub scan_batch: usize,
    /// Interval between reconnect attempts while disconnected
    pub reconnect_interval: Duration,
    /// TTL used when a tier-2 hit is promoted into tier 1
    pub promotion_ttl: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 8,
            timeout_ms: 500,
            ttl: Duration::from_secs(600),
            key_prefix: "cache:".to_string(),
            enable_compression: true,
            compression_threshold: 1024,
            scan_batch: 100,
            reconnect_interval: Duration::from_secs(5),
            promotion_ttl: Duration::from_secs(300),
        }
    }
}

impl RedisConfig {
    /// Per-call timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// == Monitoring ==
/// Alert thresholds. Rates are percentages, response time is milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Alert when the hit rate drops below this
    pub hit_rate: f64,
    /// Alert when the error rate exceeds this
    pub error_rate: f64,
    /// Alert when tier-1 memory utilization exceeds this
    pub memory_usage: f64,
    /// Alert when the average response time exceeds this
    pub response_time_ms: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hit_rate: 70.0,
            error_rate: 5.0,
            memory_usage: 90.0,
            response_time_ms: 500.0,
        }
    }
}

/// Monitor buffers and reporting cadence.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Record operations and raise alerts
    pub enabled: bool,
    /// Interval of the periodic status log
    pub report_interval: Duration,
    /// Alert thresholds
    pub thresholds: AlertThresholds,
    /// Operation ring-buffer capacity
    pub buffer_capacity: usize,
    /// Alert list capacity
    pub alert_capacity: usize,
    /// Number of recent operations used for rolling rates
    pub rolling_window: usize,
    /// Number of hourly buckets retained
    pub hourly_buckets: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval: Duration::from_secs(300),
            thresholds: AlertThresholds::default(),
            buffer_capacity: 1000,
            alert_capacity: 100,
            rolling_window: 100,
            hourly_buckets: 48,
        }
    }
}

// == TTL Policy ==
/// Per-category TTLs (seconds) used when `set` is called without one.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub dashboard: u64,
    pub financial: u64,
    pub orders: u64,
    pub products: u64,
    pub customers: u64,
    pub reports: u64,
    pub menu: u64,
    pub analytics: u64,
    /// Fallback for keys outside the known categories
    pub default: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            dashboard: 300,
            financial: 600,
            orders: 900,
            products: 3600,
            customers: 900,
            reports: 1800,
            menu: 3600,
            analytics: 600,
            default: 600,
        }
    }
}

impl TtlPolicy {
    /// Picks the TTL for a key from its category prefix.
    pub fn ttl_for_key(&self, key: &str) -> Duration {
        let category = key.split(':').next().unwrap_or_default();
        let secs = match category {
            "dashboard" => self.dashboard,
            "financial" => self.financial,
            "order" | "orders" => self.orders,
            "product" | "products" => self.products,
            "customer" | "customers" => self.customers,
            "report" | "reports" => self.reports,
            "menu" => self.menu,
            "analytics" => self.analytics,
            _ => self.default,
        };
        Duration::from_secs(secs)
    }
}

// == Config ==
/// Engine configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tier assembly
    pub strategy: CacheStrategy,
    /// Tier-1 settings
    pub local: LocalCacheConfig,
    /// Tier-2 settings
    pub redis: RedisConfig,
    /// Monitoring settings
    pub monitor: MonitorConfig,
    /// Category TTLs
    pub ttl: TtlPolicy,
    /// Admin HTTP port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Hybrid,
            local: LocalCacheConfig::default(),
            redis: RedisConfig::default(),
            monitor: MonitorConfig::default(),
            ttl: TtlPolicy::default(),
            server_port: 3000,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// See `from_lookup` for the variable names.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    ///
    /// # Environment Variables
    /// - `CACHE_STRATEGY` - local | redis | hybrid (default: hybrid)
    /// - `L1_CACHE_SIZE`, `L1_CACHE_MEMORY_MB`, `DEFAULT_TTL_SECONDS`
    /// - `CLEANUP_INTERVAL`, `MEMORY_CHECK_INTERVAL`, `MEMORY_HIGH_WATER`, `MEMORY_PRESSURE_FRACTION`,
    ///   `PROCESS_MEMORY_BUDGET_MB`
    /// - `REDIS_URL`, `REDIS_POOL_SIZE`, `REDIS_TIMEOUT_MS`, `REDIS_TTL_SECONDS`, `CACHE_KEY_PREFIX`
    /// - `ENABLE_COMPRESSION`, `COMPRESSION_THRESHOLD`, `REDIS_SCAN_BATCH`, `REDIS_RECONNECT_INTERVAL`
    /// - `L1_PROMOTION_TTL_SECONDS`
    /// - `ENABLE_CACHE_METRICS`, `METRICS_INTERVAL`, `ALERT_HIT_RATE`, `ALERT_ERROR_RATE`,
    ///   `ALERT_MEMORY_USAGE`, `ALERT_RESPONSE_TIME`
    /// - `TTL_DASHBOARD`, `TTL_FINANCIAL`, `TTL_ORDERS`, `TTL_PRODUCTS`, `TTL_CUSTOMERS`,
    ///   `TTL_REPORTS`, `TTL_MENU`, `TTL_ANALYTICS`
    /// - `SERVER_PORT`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name);
        let parse = |name: &str| var(name).and_then(|v| v.trim().parse::<u64>().ok());
        let parse_f64 = |name: &str| var(name).and_then(|v| v.trim().parse::<f64>().ok());
        // Enabled unless explicitly "false"
        let flag = |name: &str, default: bool| match var(name) {
            Some(v) => v.trim() != "false",
            None => default,
        };

        let strategy = var("CACHE_STRATEGY")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.strategy);

        let local = LocalCacheConfig {
            max_entries: parse("L1_CACHE_SIZE")
                .map(|v| v as usize)
                .unwrap_or(defaults.local.max_entries),
            max_memory_bytes: parse("L1_CACHE_MEMORY_MB")
                .map(|mb| (mb * 1024 * 1024) as usize)
                .unwrap_or(defaults.local.max_memory_bytes),
            default_ttl: parse("DEFAULT_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.local.default_ttl),
            cleanup_interval: parse("CLEANUP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.local.cleanup_interval),
            memory_check_interval: parse("MEMORY_CHECK_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.local.memory_check_interval),
            memory_high_water: parse_f64("MEMORY_HIGH_WATER")
                .unwrap_or(defaults.local.memory_high_water),
            memory_pressure_fraction: parse_f64("MEMORY_PRESSURE_FRACTION")
                .unwrap_or(defaults.local.memory_pressure_fraction),
            memory_budget_bytes: parse("PROCESS_MEMORY_BUDGET_MB")
                .filter(|mb| *mb > 0)
                .map(|mb| mb * 1024 * 1024)
                .or(defaults.local.memory_budget_bytes),
        };

        let redis = RedisConfig {
            url: var("REDIS_URL").filter(|v| !v.trim().is_empty()),
            pool_size: parse("REDIS_POOL_SIZE")
                .map(|v| v as usize)
                .unwrap_or(defaults.redis.pool_size),
            timeout_ms: parse("REDIS_TIMEOUT_MS").unwrap_or(defaults.redis.timeout_ms),
            ttl: parse("REDIS_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.redis.ttl),
            key_prefix: var("CACHE_KEY_PREFIX").unwrap_or(defaults.redis.key_prefix),
            enable_compression: flag("ENABLE_COMPRESSION", defaults.redis.enable_compression),
            compression_threshold: parse("COMPRESSION_THRESHOLD")
                .map(|v| v as usize)
                .unwrap_or(defaults.redis.compression_threshold),
            scan_batch: parse("REDIS_SCAN_BATCH")
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.redis.scan_batch),
            reconnect_interval: parse("REDIS_RECONNECT_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.redis.reconnect_interval),
            promotion_ttl: parse("L1_PROMOTION_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.redis.promotion_ttl),
        };

        let thresholds = AlertThresholds {
            hit_rate: parse_f64("ALERT_HIT_RATE").unwrap_or(defaults.monitor.thresholds.hit_rate),
            error_rate: parse_f64("ALERT_ERROR_RATE")
                .unwrap_or(defaults.monitor.thresholds.error_rate),
            memory_usage: parse_f64("ALERT_MEMORY_USAGE")
                .unwrap_or(defaults.monitor.thresholds.memory_usage),
            response_time_ms: parse_f64("ALERT_RESPONSE_TIME")
                .unwrap_or(defaults.monitor.thresholds.response_time_ms),
        };

        let monitor = MonitorConfig {
            enabled: flag("ENABLE_CACHE_METRICS", defaults.monitor.enabled),
            report_interval: parse("METRICS_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.monitor.report_interval),
            thresholds,
            ..defaults.monitor
        };

        let ttl = TtlPolicy {
            dashboard: parse("TTL_DASHBOARD").unwrap_or(defaults.ttl.dashboard),
            financial: parse("TTL_FINANCIAL").unwrap_or(defaults.ttl.financial),
            orders: parse("TTL_ORDERS").unwrap_or(defaults.ttl.orders),
            products: parse("TTL_PRODUCTS").unwrap_or(defaults.ttl.products),
            customers: parse("TTL_CUSTOMERS").unwrap_or(defaults.ttl.customers),
            reports: parse("TTL_REPORTS").unwrap_or(defaults.ttl.reports),
            menu: parse("TTL_MENU").unwrap_or(defaults.ttl.menu),
            analytics: parse("TTL_ANALYTICS").unwrap_or(defaults.ttl.analytics),
            default: local.default_ttl.as_secs(),
        };

        Self {
            strategy,
            local,
            redis,
            monitor,
            ttl,
            server_port: var("SERVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.server_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.local.max_entries, 1000);
        assert_eq!(config.local.max_memory_bytes, 100 * 1024 * 1024);
        assert_eq!(config.redis.key_prefix, "cache:");
        assert!(config.redis.url.is_none());
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_config_from_empty_lookup_matches_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.local.default_ttl, Duration::from_secs(600));
        assert_eq!(config.monitor.thresholds, AlertThresholds::default());
        assert!(config.monitor.enabled);
        assert!(config.redis.enable_compression);
        assert!(config.local.memory_budget_bytes.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(&[
            ("CACHE_STRATEGY", "local"),
            ("L1_CACHE_SIZE", "50"),
            ("L1_CACHE_MEMORY_MB", "2"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("ENABLE_COMPRESSION", "false"),
            ("ALERT_HIT_RATE", "80"),
            ("TTL_MENU", "42"),
            ("PROCESS_MEMORY_BUDGET_MB", "512"),
        ]);
        assert_eq!(config.strategy, CacheStrategy::Local);
        assert_eq!(config.local.max_entries, 50);
        assert_eq!(config.local.max_memory_bytes, 2 * 1024 * 1024);
        assert_eq!(config.redis.url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert!(!config.redis.enable_compression);
        assert_eq!(config.monitor.thresholds.hit_rate, 80.0);
        assert_eq!(config.ttl.menu, 42);
        assert_eq!(config.local.memory_budget_bytes, Some(512 * 1024 * 1024));
    }

    #[test]
    fn test_config_ignores_garbage() {
        let config = config_from(&[("L1_CACHE_SIZE", "lots"), ("CACHE_STRATEGY", "mystery")]);
        assert_eq!(config.local.max_entries, 1000);
        assert_eq!(config.strategy, CacheStrategy::Hybrid);
    }

    #[test]
    fn test_ttl_for_key_by_category() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for_key("dashboard:summary"), Duration::from_secs(300));
        assert_eq!(policy.ttl_for_key("order:12"), Duration::from_secs(900));
        assert_eq!(policy.ttl_for_key("orders:pending"), Duration::from_secs(900));
        assert_eq!(policy.ttl_for_key("menu:all"), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for_key("misc:thing"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for_key(""), Duration::from_secs(600));
    }
}
