//! Remote Tier Module
//!
//! Contract for the shared network key-value store behind tier 2, plus a
//! Redis implementation and an in-process implementation for tests.

mod memory;
mod redis_tier;

pub use self::memory::InMemoryRemote;
pub use self::redis_tier::RedisTier;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;

// == Connection State ==
/// disconnected -> connecting -> connected -> disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Current connection state plus a change feed.
///
/// Subscribers receive every transition; this stands in for the ready /
/// error / close lifecycle callbacks of a driver.
#[derive(Debug)]
pub struct ConnectionStatus {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

impl ConnectionStatus {
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Moves to `next`, logging real transitions.
    pub fn set(&self, next: ConnectionState) {
        let previous = self.tx.send_replace(next);
        if previous == next {
            return;
        }
        match next {
            ConnectionState::Connected => info!("Remote tier connected"),
            ConnectionState::Connecting => info!("Remote tier connecting"),
            ConnectionState::Disconnected => warn!("Remote tier disconnected"),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

// == Remote Tier Trait ==
/// Network key-value store used as tier 2.
///
/// Implementations report their own connection state and move to
/// `Disconnected` when a call fails at the transport level. Callers apply
/// their own per-call timeouts.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Feed of connection state transitions.
    fn subscribe(&self) -> watch::Receiver<ConnectionState>;

    /// Establishes (or re-establishes) the connection.
    async fn connect(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a payload. `Duration::ZERO` stores it without expiry.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Deletes keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// One cursor step over keys matching a glob. A returned cursor of 0
    /// means the iteration is complete.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;
}
