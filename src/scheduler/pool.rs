use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Bounded pool for cycle work, so the scheduler's tick loop never runs
/// network I/O itself.
#[derive(Clone)]
pub struct CyclePool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl CyclePool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `fut` on the pool once a worker slot is free.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("Cycle pool closed, dropping work");
                return None;
            };
            Some(fut.await)
        })
    }
}
