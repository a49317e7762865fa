//! Redis JobStateRepository implementation.

use super::error::RedisAdapterError;
use super::job_state_key;
use super::pool::RedisPool;
use crate::domain::jobs::{JobId, JobSnapshot};
use crate::ports::repository::{JobStateRepository, StoreError};
use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};

#[async_trait]
impl JobStateRepository for RedisPool {
    async fn put_job_state(&self, snapshot: &JobSnapshot) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = job_state_key(&snapshot.job_id);
        let json = serde_json::to_string(snapshot)?;
        match self.result_ttl {
            Some(ttl) => redis::cmd("SET")
                .arg(&key)
                .arg(json)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(RedisAdapterError::from)?,
            None => conn
                .set::<_, _, ()>(&key, json)
                .await
                .map_err(RedisAdapterError::from)?,
        }
        Ok(())
    }

    async fn get_job_state(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, StoreError> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn
            .get(job_state_key(job_id))
            .await
            .map_err(RedisAdapterError::from)?;
        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}
