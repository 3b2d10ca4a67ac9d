//! Prometheus text exposition for cache metrics.

use std::fmt::Write;

use crate::layer::LayerStats;

/// Metric name prefix applied to the counters.
pub const METRIC_PREFIX: &str = "cache";

fn gauge(output: &mut String, name: &str, help: &str, value: f64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} gauge", name);
    let _ = writeln!(output, "{} {}", name, value);
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {}_total {}", name, help);
    let _ = writeln!(output, "# TYPE {}_total counter", name);
    let _ = writeln!(output, "{}_total {}", name, value);
}

/// Renders the cache gauges and counters in text exposition format.
pub fn render(stats: &LayerStats, ops_per_second: f64) -> String {
    let mut output = String::new();
    let local = stats.local();

    gauge(
        &mut output,
        "cache_hit_rate",
        "Cache hit rate percentage",
        stats.hit_rate(),
    );
    gauge(
        &mut output,
        "cache_size_total",
        "Number of entries in the local tier",
        local.size as f64,
    );
    gauge(
        &mut output,
        "cache_memory_usage_bytes",
        "Approximate bytes held by the local tier",
        local.memory_usage_bytes as f64,
    );
    gauge(
        &mut output,
        "cache_operations_per_second",
        "Cache operations per second over the last minute",
        ops_per_second,
    );

    counter(
        &mut output,
        &format!("{}_hits", METRIC_PREFIX),
        "Local tier hits",
        local.counters.hits,
    );
    counter(
        &mut output,
        &format!("{}_misses", METRIC_PREFIX),
        "Local tier misses",
        local.counters.misses,
    );
    counter(
        &mut output,
        &format!("{}_evictions", METRIC_PREFIX),
        "Entries evicted by capacity limits",
        local.counters.evictions,
    );
    counter(
        &mut output,
        &format!("{}_expirations", METRIC_PREFIX),
        "Entries removed after their TTL elapsed",
        local.counters.expirations,
    );
    counter(
        &mut output,
        &format!("{}_errors", METRIC_PREFIX),
        "Local tier faults",
        local.counters.errors,
    );

    if let LayerStats::Tiered(tiered) = stats {
        let remote = &tiered.remote.counters;
        counter(
            &mut output,
            &format!("{}_remote_hits", METRIC_PREFIX),
            "Reads served by the remote tier",
            remote.remote_hits,
        );
        counter(
            &mut output,
            &format!("{}_remote_errors", METRIC_PREFIX),
            "Remote tier faults",
            remote.remote_errors,
        );
        counter(
            &mut output,
            &format!("{}_fallbacks", METRIC_PREFIX),
            "Reads that fell back to the local tier",
            remote.fallbacks_to_local,
        );
    }

    output
}
