//! In-process remote tier.
//!
//! Behaves like a shared store for a single process. Connectivity, failures
//! and latency can be forced, which makes degraded-mode behavior testable
//! without a live Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::GlobPattern;
use crate::error::{CacheError, Result};
use crate::remote::{ConnectionState, ConnectionStatus, RemoteTier};

#[derive(Debug)]
struct Stored {
    bytes: Vec<u8>,
    /// Insertion sequence, stable across overwrites
    seq: u64,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

/// Remote tier held in process memory.
#[derive(Debug)]
pub struct InMemoryRemote {
    data: Mutex<HashMap<String, Stored>>,
    status: ConnectionStatus,
    /// Whether `connect` succeeds
    reachable: AtomicBool,
    /// Fail every operation while still reporting connected
    failing: AtomicBool,
    /// Added to every operation, in milliseconds
    latency_ms: AtomicU64,
    next_seq: AtomicU64,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// Creates a reachable, not yet connected store.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            status: ConnectionStatus::default(),
            reachable: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Creates a store that is already connected.
    pub fn connected() -> Self {
        let remote = Self::new();
        remote.status.set(ConnectionState::Connected);
        remote
    }

    /// Forces the connection up or down. While down, `connect` fails too.
    pub fn set_connected(&self, connected: bool) {
        self.reachable.store(connected, Ordering::SeqCst);
        self.status.set(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    /// Drops the connection while leaving the store reachable, as a
    /// transport error would.
    pub fn drop_connection(&self) {
        self.status.set(ConnectionState::Disconnected);
    }

    /// Makes every operation return a remote error without dropping the connection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Raw stored payload, bypassing connectivity checks.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.data
            .lock()
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.bytes.clone())
    }

    /// Number of live keys, bypassing connectivity checks.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.lock().values().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_connected() {
            return Err(CacheError::RemoteUnavailable);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Remote("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTier for InMemoryRemote {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn state(&self) -> ConnectionState {
        self.status.get()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        self.status.set(ConnectionState::Connecting);
        if self.reachable.load(Ordering::SeqCst) {
            self.status.set(ConnectionState::Connected);
            Ok(())
        } else {
            self.status.set(ConnectionState::Disconnected);
            Err(CacheError::RemoteUnavailable)
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter().await?;
        Ok(self.raw(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.enter().await?;
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut data = self.data.lock();
        let seq = match data.get(key) {
            Some(existing) => existing.seq,
            None => self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        data.insert(
            key.to_string(),
            Stored {
                bytes: value.to_vec(),
                seq,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.enter().await?;
        let mut data = self.data.lock();
        Ok(keys.iter().filter(|key| data.remove(key.as_str()).is_some()).count() as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.enter().await?;
        Ok(self.raw(key).is_some())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        self.enter().await?;
        let glob = GlobPattern::new(pattern)?;
        let now = Instant::now();

        // Cursor is the last insertion sequence visited, so deletes between
        // steps never cause keys to be skipped
        let mut candidates: Vec<(u64, String)> = self
            .data
            .lock()
            .iter()
            .filter(|(_, stored)| stored.seq > cursor && stored.is_live(now))
            .map(|(key, stored)| (stored.seq, key.clone()))
            .collect();
        candidates.sort();

        let take = count.max(1).min(candidates.len());
        let next = if take < candidates.len() {
            candidates[take - 1].0
        } else {
            0
        };
        let page: Vec<String> = candidates
            .into_iter()
            .take(take)
            .map(|(_, key)| key)
            .filter(|key| glob.matches(key))
            .collect();

        Ok((next, page))
    }
}
