//! Redis-backed remote tier on a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::info;

use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::remote::{ConnectionState, ConnectionStatus, RemoteTier};

/// Tier 2 over Redis.
///
/// The pool reconnects lazily; this type only tracks whether the last
/// attempt worked so callers can skip the network while it is down.
pub struct RedisTier {
    pool: Pool,
    status: ConnectionStatus,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("state", &self.status.get())
            .finish()
    }
}

impl RedisTier {
    /// Builds the pool. No connection is made until `connect`.
    pub fn from_config(config: &RedisConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or(CacheError::RemoteUnavailable)?;
        info!(url = %url, pool_size = config.pool_size, "Creating Redis pool");

        let timeout = Some(config.timeout());
        let mut redis_config = deadpool_redis::Config::from_url(url);
        let pool_config = redis_config
            .pool
            .get_or_insert_with(|| PoolConfig::new(config.pool_size));
        pool_config.max_size = config.pool_size;
        pool_config.timeouts = Timeouts {
            wait: timeout,
            create: timeout,
            recycle: timeout,
        };

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Remote(format!("failed to create Redis pool: {}", e)))?;

        Ok(Self {
            pool,
            status: ConnectionStatus::default(),
        })
    }

    async fn conn(&self) -> Result<Connection> {
        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                self.status.set(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Converts a command error, dropping to disconnected on transport faults.
    fn fail(&self, e: redis::RedisError) -> CacheError {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
        {
            self.status.set(ConnectionState::Disconnected);
        }
        e.into()
    }
}

#[async_trait]
impl RemoteTier for RedisTier {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn state(&self) -> ConnectionState {
        self.status.get()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        self.status.set(ConnectionState::Connecting);
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                self.status.set(ConnectionState::Disconnected);
                CacheError::from(e)
            })?;
        self.status.set(ConnectionState::Connected);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let result = if ttl.is_zero() {
            conn.set::<_, _, ()>(key, value).await
        } else {
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await
        };
        result.map_err(|e| self.fail(e))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        conn.del::<_, u64>(keys).await.map_err(|e| self.fail(e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.exists::<_, bool>(key).await.map_err(|e| self.fail(e))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.conn().await?;
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.fail(e))?;
        Ok((next, keys))
    }
}
