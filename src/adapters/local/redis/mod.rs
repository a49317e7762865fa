//! Redis adapter for multi-process deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` as a list (LPUSH / BRPOP)
//! - `JobStateRepository` as one JSON value per job

mod error;
mod pool;
mod queue;
mod repository;

pub use error::RedisAdapterError;
pub use pool::RedisPool;

/// Redis key constants
const JOB_QUEUE: &str = "sonata:jobs";
const JOB_STATE_PREFIX: &str = "sonata:job:";

fn job_state_key(job_id: &crate::domain::jobs::JobId) -> String {
    format!("{}{}", JOB_STATE_PREFIX, job_id)
}
