//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the engine is up.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired tier-1 entries at configured intervals
//! - Memory Pressure: Sheds tier-1 entries when process memory runs high
//! - Reconnect: Re-establishes the remote tier after an outage
//! - Event Listener: Feeds domain events to the invalidation manager
//! - Monitor Report: Logs the cache status

mod cleanup;
mod events;
mod reconnect;
mod report;

pub use cleanup::{spawn_cleanup_task, spawn_memory_pressure_task};
pub use events::spawn_event_listener;
pub use reconnect::{connect_remote, spawn_reconnect_task};
pub use report::spawn_monitor_report_task;
