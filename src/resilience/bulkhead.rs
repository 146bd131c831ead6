use crate::error::{AnalysisError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

/// Bounded in-flight concurrency pool for one upstream source
///
/// Saturation is reported as [`AnalysisError::BulkheadSaturated`], distinct
/// from a network failure, so the caller can tell "we were too busy" apart
/// from "the upstream broke".
pub struct Bulkhead {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    acquire_wait: Duration,
}

impl Bulkhead {
    /// Creates a pool of `permits` in-flight slots with the given acquire wait
    pub fn new(name: &'static str, permits: usize, acquire_wait: Duration) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            acquire_wait,
        }
    }

    /// Waits up to the configured window for a free slot
    ///
    /// The returned permit releases its slot when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        match timeout(self.acquire_wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // The semaphore is never closed
            Ok(Err(_)) => Err(AnalysisError::new("bulkhead semaphore closed")),
            Err(_) => Err(AnalysisError::BulkheadSaturated(format!(
                "{}: no free slot within {:?}",
                self.name, self.acquire_wait
            ))),
        }
    }

    /// Free slots right now, for diagnostics
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let bulkhead = Bulkhead::new("test", 2, Duration::from_millis(50));

        let p1 = bulkhead.acquire().await.unwrap();
        let _p2 = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.available(), 0);

        drop(p1);
        assert_eq!(bulkhead.available(), 1);
        assert!(bulkhead.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_saturation_is_distinct_error() {
        let bulkhead = Bulkhead::new("test", 1, Duration::from_millis(20));

        let _held = bulkhead.acquire().await.unwrap();
        let err = bulkhead.acquire().await.unwrap_err();
        assert!(matches!(err, AnalysisError::BulkheadSaturated(_)));
    }

    #[tokio::test]
    async fn test_waits_for_freed_permit() {
        let bulkhead = Arc::new(Bulkhead::new("test", 1, Duration::from_millis(500)));

        let held = bulkhead.acquire().await.unwrap();
        let contender = {
            let bulkhead = Arc::clone(&bulkhead);
            tokio::spawn(async move { bulkhead.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(contender.await.unwrap().is_ok());
    }
}
