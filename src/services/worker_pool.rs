use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::services::processor::JobProcessor;
use crate::services::queue::{JobDispatcher, QueueError};

/// In-process dispatcher: a bounded channel drained by a fixed set of tasks.
///
/// Used when no Redis queue is configured. Jobs in the channel are lost if the
/// process exits; `JobStore::fail_stalled` cleans up on the next start.
pub struct WorkerPool {
    sender: mpsc::Sender<Uuid>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(processor: Arc<JobProcessor>, concurrency: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let processor = processor.clone();
                tokio::spawn(run_worker(worker_id, receiver, processor))
            })
            .collect();

        info!(concurrency, capacity, "Started in-process worker pool");
        Self { sender, handles }
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Uuid>>>,
    processor: Arc<JobProcessor>,
) {
    debug!(worker_id, "Worker started");
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };

        let Some(job_id) = next else {
            break;
        };

        if let Err(e) = processor.process(job_id).await {
            // The job stays in `processing` until the stalled-job sweep.
            error!(worker_id, job_id = %job_id, error = %e, "Failed to record job outcome");
        }
    }
    debug!(worker_id, "Worker stopped");
}

#[async_trait]
impl JobDispatcher for WorkerPool {
    /// Never waits for a free slot; a full queue is reported as `Full`.
    async fn dispatch(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.sender.try_send(job_id).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn spare_capacity(&self) -> Option<usize> {
        Some(self.sender.capacity())
    }
}
