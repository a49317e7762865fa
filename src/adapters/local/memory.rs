//! In-process queue and state store for single-binary deployments and tests.

use crate::domain::jobs::{Job, JobId, JobSnapshot};
use crate::ports::queue::{JobQueuePort, QueueError};
use crate::ports::repository::{JobStateRepository, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// FIFO queue shared by every clone. Each job goes to exactly one consumer.
#[derive(Clone)]
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueuePort for InMemoryQueue {
    async fn enqueue_job(&self, job: Job) -> Result<(), QueueError> {
        self.sender
            .send(job)
            .map_err(|_| QueueError::Unavailable("queue receiver dropped".to_string()))
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let received = tokio::time::timeout(timeout, async {
            self.receiver.lock().await.recv().await
        })
        .await;
        match received {
            Ok(Some(job)) => Ok(Some(job)),
            Ok(None) => Err(QueueError::Unavailable("queue closed".to_string())),
            Err(_) => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    snapshots: Arc<RwLock<HashMap<JobId, JobSnapshot>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStateRepository for InMemoryStore {
    async fn put_job_state(&self, snapshot: &JobSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.job_id, snapshot.clone());
        Ok(())
    }

    async fn get_job_state(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(job_id).cloned())
    }
}
