//! Periodic monitor report.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::monitor::CacheMonitor;

/// Spawns a task that logs the monitor status every `interval`.
pub fn spawn_monitor_report_task(monitor: Arc<CacheMonitor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Starting cache monitor report task");

        loop {
            tokio::time::sleep(interval).await;
            monitor.log_report().await;
        }
    })
}
