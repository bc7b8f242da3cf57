use crate::IcwError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission gate shared by concurrent tasks.
///
/// Cloning a `Throttle` shares the same permit pool. Two separately
/// constructed throttles are unrelated: holding a permit on one says nothing
/// about the other.
#[derive(Clone, Debug)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held permit. Dropping it (or calling [`ThrottlePermit::release`])
/// returns the permit and wakes at most one waiter.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

impl ThrottlePermit {
    pub fn release(self) {}
}

impl Throttle {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Suspend until a permit is free.
    pub async fn acquire(&self) -> Result<ThrottlePermit, IcwError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IcwError::Task(format!("throttle closed: {}", e)))?;
        Ok(ThrottlePermit { _permit: permit })
    }
}
