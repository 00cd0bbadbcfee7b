//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count in-flight tunnel connections
//! - Tell connections to drain when the listener stops
//! - Bound how long a stopping server waits for them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::lifecycle::{WorkGuard, WorkTracker};
use crate::observability::metrics;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Per-process sequence number of an accepted tunnel connection, shown in
/// logs as `conn-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks the connections served by one listener.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: WorkTracker,
    drain_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            active: WorkTracker::new(),
            drain_tx: Arc::new(tx),
        }
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        metrics::record_connection_opened();
        ConnectionGuard {
            _work: self.active.track(),
            id: ConnectionId::next(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> usize {
        self.active.outstanding()
    }

    /// Receiver that flips to `true` once draining starts.
    pub fn drain_receiver(&self) -> watch::Receiver<bool> {
        self.drain_tx.subscribe()
    }

    /// Ask every tracked connection to finish up.
    pub fn begin_drain(&self) {
        self.drain_tx.send_replace(true);
    }

    /// Wait for all connections to close, giving up after `timeout`.
    ///
    /// Returns `true` when every connection closed in time.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.active.wait()).await.is_ok()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    _work: WorkGuard,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::record_connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second.0 > first.0);
        assert_eq!(second.to_string(), format!("conn-{}", second.0));
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn drain_signal_reaches_receivers() {
        let tracker = ConnectionTracker::new();
        let mut rx = tracker.drain_receiver();
        assert!(!*rx.borrow());

        tracker.begin_drain();
        rx.wait_for(|draining| *draining).await.unwrap();
        // Receivers created after the fact see it too.
        assert!(*tracker.drain_receiver().borrow());
    }

    #[tokio::test]
    async fn drain_wait_is_bounded() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        assert!(!tracker.wait_for_drain(Duration::from_millis(20)).await);

        drop(guard);
        assert!(tracker.wait_for_drain(Duration::from_millis(20)).await);
    }
}
