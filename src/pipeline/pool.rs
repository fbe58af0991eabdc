//! Worker admission and cancellation

use std::sync::Arc;
use tokio::sync::{watch, AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting semaphore shared by every document in the process.
///
/// Admission is first-come-first-served (tokio's semaphore is fair); there is
/// no priority between documents.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
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

    /// Workers currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a worker slot; the slot is returned when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.permits.clone().acquire_owned().await
    }
}

/// Document-level cancellation signal.
///
/// Clones observe the same signal. Each extraction gets its own, so
/// cancelling one document never touches another.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Cancellation::cancel`] has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Errors only when the sender is dropped, and `self` holds it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_bounds_permits() {
        let pool = WorkerPool::new(2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire().await.is_ok());
    }

    #[test]
    fn test_pool_size_at_least_one() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_wakes_waiters() {
        let cancel = Cancellation::new();
        let observer = cancel.clone();
        let waiter = tokio::spawn(async move { observer.cancelled().await });

        assert!(!cancel.is_cancelled());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_after_the_fact_resolves_immediately() {
        let cancel = Cancellation::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(100), cancel.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_independent_cancellations() {
        let first = Cancellation::new();
        let second = Cancellation::new();
        first.cancel();
        assert!(!second.is_cancelled());
        let pending = tokio::time::timeout(Duration::from_millis(50), second.cancelled()).await;
        assert!(pending.is_err());
    }
}
