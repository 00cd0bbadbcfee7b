//! Bounded pool of public port numbers.
//!
//! # Responsibilities
//! - Hand out each port in `[min, max]` to at most one tunnel at a time
//! - Take ports back, ignoring unknown or duplicate releases
//! - Optionally let a caller wait, with a deadline, for a port to come back
//!
//! # Design Decisions
//! - `allocate` fails fast with `Exhausted`; waiting is an explicit opt-in
//! - The lowest free port is always handed out first
//! - A single mutex guards both sets so a port is never in both or neither

use std::collections::{BTreeSet, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::observability::metrics;

/// Errors returned by [`PortRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortRegistryError {
    /// Every port in the range is currently allocated.
    #[error("cannot allocate port: all {capacity} ports in {min}-{max} are in use")]
    Exhausted { min: u16, max: u16, capacity: usize },
}

#[derive(Debug)]
struct PoolState {
    available: BTreeSet<u16>,
    allocated: HashSet<u16>,
}

/// A fixed range of ports shared by concurrent tunnel sessions.
#[derive(Debug)]
pub struct PortRegistry {
    min: u16,
    max: u16,
    state: Mutex<PoolState>,
    released: Notify,
}

impl PortRegistry {
    /// Create a registry covering `[min, max]`. Swapped bounds are normalized.
    pub fn new(min: u16, max: u16) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };

        Self {
            min,
            max,
            state: Mutex::new(PoolState {
                available: (min..=max).collect(),
                allocated: HashSet::new(),
            }),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exhausted(&self) -> PortRegistryError {
        PortRegistryError::Exhausted {
            min: self.min,
            max: self.max,
            capacity: self.capacity(),
        }
    }

    /// Claim the lowest free port.
    pub fn allocate(&self) -> Result<u16, PortRegistryError> {
        let mut state = self.lock();
        let port = state.available.pop_first().ok_or_else(|| self.exhausted())?;
        state.allocated.insert(port);
        metrics::set_ports_allocated(state.allocated.len());
        drop(state);

        tracing::debug!(port, "Port allocated");
        Ok(port)
    }

    /// Claim a port, waiting up to `timeout` for one to be released.
    pub async fn allocate_timeout(&self, timeout: Duration) -> Result<u16, PortRegistryError> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            match self.allocate() {
                Ok(port) => return Ok(port),
                Err(e) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        tracing::debug!(timeout = ?timeout, "Timed out waiting for a free port");
                        return self.allocate().map_err(|_| e);
                    }
                }
            }
        }
    }

    /// Return `port` to the pool. Unknown, duplicate, and out-of-range
    /// releases are ignored.
    pub fn release(&self, port: u16) {
        let mut state = self.lock();
        if !state.allocated.remove(&port) {
            return;
        }
        state.available.insert(port);
        metrics::set_ports_allocated(state.allocated.len());
        drop(state);

        tracing::debug!(port, "Port released");
        self.released.notify_waiters();
    }

    /// Whether `port` is currently handed out.
    pub fn is_allocated(&self, port: u16) -> bool {
        self.lock().allocated.contains(&port)
    }

    /// Total number of ports managed.
    pub fn capacity(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// Number of ports that can be allocated right now.
    pub fn available_count(&self) -> usize {
        self.lock().available.len()
    }

    /// Number of ports currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.lock().allocated.len()
    }

    /// The managed range.
    pub fn range(&self) -> RangeInclusive<u16> {
        self.min..=self.max
    }
}
