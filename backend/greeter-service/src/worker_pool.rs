//! Bounded admission for in-flight calls
//!
//! One slot per call for the whole call, streaming included. Callers beyond
//! capacity wait in arrival order; nothing is rejected and no timeout is
//! applied here.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{GreeterError, Result};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

/// Held for the lifetime of one call; dropping it frees the worker
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// A size of zero is raised to one
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.size - self.available()
    }

    pub async fn acquire(&self) -> Result<WorkerSlot> {
        if self.available() == 0 {
            debug!(size = self.size, "Worker pool saturated, call queued");
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GreeterError::Internal("worker pool closed".to_string()))?;

        Ok(WorkerSlot { _permit: permit })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_POOL_SIZE)
    }
}
