use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0} is overloaded")]
pub struct Overloaded(pub &'static str);

/// Bounded concurrency with a bounded wait queue. Callers beyond
/// `max_in_flight + max_waiting` are turned away instead of piling up.
#[derive(Debug)]
pub struct Admission {
    name: &'static str,
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_waiting: usize,
}

impl Admission {
    pub fn new(name: &'static str, max_in_flight: usize, max_waiting: usize) -> Self {
        Admission {
            name,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            waiting: AtomicUsize::new(0),
            max_waiting,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, Overloaded> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(Overloaded(self.name)),
            Err(TryAcquireError::NoPermits) => {}
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = QueueSlot(&self.waiting);
        if queued >= self.max_waiting {
            log::warn!("{} queue full ({} waiting)", self.name, queued);
            return Err(Overloaded(self.name));
        }

        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Overloaded(self.name))
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}

/// Leaves the wait queue on drop, including when the waiter is cancelled.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
