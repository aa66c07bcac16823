//! Bounded Worker Pool
//!
//! A fixed number of permits shared by inbound submission handling and outbound
//! sub-task dispatch. Submitting never blocks: a job waits for a permit inside its own
//! task, so the pool behaves like a fixed-size thread pool with an unbounded queue.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        tracing::info!("Worker pool created with {} slots", size);

        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently running a job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queues `job`. The handle yields `None` only if the pool was shut down before the
    /// job could start.
    pub fn submit<F>(&self, job: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Worker pool closed, dropping job: {}", e);
                    return None;
                }
            };

            Some(job.await)
        })
    }

    /// Stops admitting queued jobs; running jobs finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}
