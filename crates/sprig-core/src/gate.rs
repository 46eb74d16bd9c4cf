//! Admission gate
//!
//! Bounded-concurrency limiter for handler execution. A permit is held for
//! the whole handler invocation and released when dropped.

use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permits per logical core when no explicit capacity is configured
pub const PERMITS_PER_CORE: usize = 100;

/// Default gate capacity: `PERMITS_PER_CORE` x logical cores
pub fn default_capacity() -> usize {
    num_cpus::get().saturating_mul(PERMITS_PER_CORE).max(1)
}

/// Counting semaphore limiting in-flight handlers
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted slot; dropping it releases the slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a slot is free
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(|permit| AdmissionPermit { _permit: permit })
            .map_err(|_| Error::GateClosed)
    }

    /// Wait at most `timeout` for a slot
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<AdmissionPermit> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| Error::AdmissionTimeout)?
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Stop handing out permits; pending and future acquires fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available().min(self.capacity)
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(default_capacity())
    }
}
