//! Outstanding background work accounting.
//!
//! A task registers with [`WorkTracker::track`] before it is spawned and holds
//! the returned [`WorkGuard`] for its whole lifetime. Dropping the guard is the
//! only way to decrement, so each task is counted out exactly once no matter
//! how it exits (return, error, or panic unwinding).

use std::sync::Arc;

use tokio::sync::watch;

/// Counts in-flight background tasks and lets observers wait for zero.
#[derive(Debug, Clone)]
pub struct WorkTracker {
    count: Arc<watch::Sender<usize>>,
}

impl WorkTracker {
    /// Create a tracker with no outstanding work.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Register one unit of work. The count drops when the guard does.
    pub fn track(&self) -> WorkGuard {
        self.count.send_modify(|n| *n += 1);
        WorkGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Current number of outstanding units.
    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no work is outstanding.
    ///
    /// Returns immediately when nothing was ever tracked. Any number of
    /// callers may wait at the same time.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            // The sender lives as long as `self`, so this cannot fail.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` reads `true`, or its sender is gone.
pub async fn flag_raised(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Held by a running task; decrements the tracker on drop.
#[derive(Debug)]
pub struct WorkGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_without_work_returns() {
        let tracker = WorkTracker::new();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
    }

    #[test]
    fn guards_count() {
        let tracker = WorkTracker::new();
        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.outstanding(), 2);
        drop(a);
        assert_eq!(tracker.outstanding(), 1);
        drop(b);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn many_waiters_wake_together() {
        let tracker = WorkTracker::new();
        let guard = tracker.track();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        drop(guard);
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn flag_raised_by_send_or_drop() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        flag_raised(&mut rx).await;

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        flag_raised(&mut rx).await;
    }

    #[tokio::test]
    async fn panicking_task_still_counts_out() {
        let tracker = WorkTracker::new();
        let guard = tracker.track();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("task failed");
        });
        assert!(handle.await.is_err());

        assert_eq!(tracker.outstanding(), 0);
    }
}
