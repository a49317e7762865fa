//! Redis JobQueuePort implementation.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use super::JOB_QUEUE;
use crate::domain::jobs::Job;
use crate::ports::queue::{JobQueuePort, QueueError};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use std::time::Duration;

#[async_trait]
impl JobQueuePort for RedisPool {
    async fn enqueue_job(&self, job: Job) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(&job)?;
        conn.lpush::<_, _, ()>(JOB_QUEUE, json)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let mut conn = self.connection().await?;
        // BRPOP treats 0 as "block forever"
        let timeout_secs = timeout.as_secs_f64().max(0.01);
        let result: Option<(String, String)> = conn
            .brpop(JOB_QUEUE, timeout_secs)
            .await
            .map_err(RedisAdapterError::from)?;
        match result {
            Some((_, json)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
