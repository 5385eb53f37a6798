//! Fail-fast concurrency cap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::GuardError;

#[derive(Debug)]
struct Counter {
    in_flight: AtomicUsize,
    limit: usize,
}

/// Counts operations in progress and refuses new ones at the limit.
///
/// Cloning shares the same counter. There is no waiting: a caller that
/// can't get a lease gets [`GuardError::Saturated`] immediately.
#[derive(Debug, Clone)]
pub struct InFlightLimiter {
    counter: Arc<Counter>,
}

impl InFlightLimiter {
    /// A limit of 0 is raised to 1.
    pub fn new(limit: usize) -> Self {
        Self {
            counter: Arc::new(Counter {
                in_flight: AtomicUsize::new(0),
                limit: limit.max(1),
            }),
        }
    }

    pub fn try_acquire(&self) -> Result<InFlightLease, GuardError> {
        let counter = &self.counter;
        let mut current = counter.in_flight.load(Ordering::Acquire);
        loop {
            if current >= counter.limit {
                return Err(GuardError::Saturated {
                    limit: counter.limit,
                });
            }
            match counter.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(InFlightLease {
                        counter: Arc::clone(counter),
                        released: false,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.counter.in_flight.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.counter.limit
    }
}

/// One slot of an [`InFlightLimiter`]. Released on drop.
#[derive(Debug)]
pub struct InFlightLease {
    counter: Arc<Counter>,
    released: bool,
}

impl InFlightLease {
    /// Gives the slot back early. Calling it twice is harmless.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counter.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for InFlightLease {
    fn drop(&mut self) {
        self.release();
    }
}
