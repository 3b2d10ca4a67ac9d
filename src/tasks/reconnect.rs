//! Remote reconnect task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::{ConnectionState, RemoteTier};

/// Spawns a task that retries `connect` every `interval` while the remote
/// tier is disconnected. Foreground calls never wait on it.
///
/// The task idles on the tier's state feed while connected.
pub fn spawn_reconnect_task(remote: Arc<dyn RemoteTier>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            remote = remote.name(),
            interval_ms = interval.as_millis() as u64,
            "Starting remote reconnect task"
        );

        let mut state = remote.subscribe();
        loop {
            let closed = state
                .wait_for(|s| *s == ConnectionState::Disconnected)
                .await
                .is_err();
            if closed {
                debug!(remote = remote.name(), "State feed closed, reconnect task exiting");
                break;
            }

            tokio::time::sleep(interval).await;

            if remote.state() != ConnectionState::Disconnected {
                continue;
            }

            match remote.connect().await {
                Ok(()) => info!(remote = remote.name(), "Remote tier reconnected"),
                Err(e) => debug!(remote = remote.name(), error = %e, "Reconnect attempt failed"),
            }
        }
    })
}

/// Connects once at startup. Failure leaves the tier disconnected for the
/// reconnect task to retry.
pub async fn connect_remote(remote: &dyn RemoteTier) -> bool {
    match remote.connect().await {
        Ok(()) => {
            info!(remote = remote.name(), "Remote tier connected");
            true
        }
        Err(e) => {
            warn!(
                remote = remote.name(),
                error = %e,
                "Remote tier unavailable, serving from local tier"
            );
            false
        }
    }
}
