//! Domain event listener.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::invalidation::{DomainEvent, InvalidationManager};

/// Spawns a task that invalidates every event received on the channel.
///
/// Failed invalidations are already counted by the manager; the listener
/// logs them and keeps going. The task ends when every sender is dropped.
pub fn spawn_event_listener(
    manager: Arc<InvalidationManager>,
    mut events: broadcast::Receiver<DomainEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting invalidation event listener");

        loop {
            match events.recv().await {
                Ok(event) => match manager.invalidate(&event.event_type, &event.payload).await {
                    Ok(result) => debug!(
                        event = %event.event_type,
                        total = result.total_invalidated,
                        "Event invalidated"
                    ),
                    Err(e) => warn!(event = %event.event_type, error = %e, "Event invalidation failed"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Invalidation listener lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    info!("Invalidation event channel closed");
                    break;
                }
            }
        }
    })
}
