use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const QUEUE_KEY: &str = "app_screenshots:jobs";
const PROCESSING_KEY: &str = "app_screenshots:processing";

/// Hands a freshly created job to whatever runs the processor.
///
/// `dispatch` must not wait for the job to be processed.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;

    /// How many more jobs `dispatch` can take right now, if bounded.
    fn spare_capacity(&self) -> Option<usize> {
        None
    }
}

/// Job payload serialized into Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: Uuid,
}

/// Redis-backed durable job queue, consumed by the `worker` binary.
///
/// Dequeued payloads sit in a processing list until `complete` is called,
/// so a crashed worker leaves evidence behind instead of losing the job.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    /// Pop the oldest job and move it to the processing list.
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Remove a job from the processing list.
    pub async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    /// Drain the processing list left behind by a previous worker run.
    ///
    /// The returned jobs are no longer tracked by Redis; the caller resolves
    /// them against the job store.
    pub async fn take_orphans(&self) -> Result<Vec<QueuedJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payloads: Vec<String> = conn.lrange(PROCESSING_KEY, 0, -1).await?;
        conn.del::<_, ()>(PROCESSING_KEY).await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(QueueError::Serialize))
            .collect()
    }

    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.enqueue(&QueuedJob { job_id }).await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Worker pool is shut down")]
    Closed,

    #[error("Worker pool queue is full")]
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(&QueuedJob { job_id: id }).unwrap();
        assert_eq!(payload, format!("{{\"job_id\":\"{id}\"}}"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis: REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    async fn test_enqueue_dequeue_complete() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let queue = JobQueue::new(&url).unwrap();
        let job = QueuedJob {
            job_id: Uuid::new_v4(),
        };

        queue.enqueue(&job).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().expect("job in queue");
        assert_eq!(dequeued, job);
        queue.complete(&dequeued).await.unwrap();
    }
}
