//! Redis connection pool.

use super::error::RedisAdapterError;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::time::Duration;

/// Redis-backed adapter for queue and repository operations.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    /// Expiry applied to job snapshots.
    pub(super) result_ttl: Option<Duration>,
}

impl RedisPool {
    /// Create a new RedisPool with connection pool.
    ///
    /// No connection is opened until the first command.
    pub fn new(redis_url: &str, result_ttl: Option<Duration>) -> Result<Self, RedisAdapterError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, result_ttl })
    }

    pub(super) async fn connection(&self) -> Result<Connection, RedisAdapterError> {
        Ok(self.pool.get().await?)
    }
}
