use crate::model::{FetchStatus, Source};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Collects and tracks analysis metrics: cache hits, fetch outcomes per
/// source, and aggregation timings
pub struct Metrics {
    counters: Arc<RwLock<HashMap<String, u64>>>,
    timers: Arc<RwLock<HashMap<String, Duration>>>,
}

impl Metrics {
    /// Creates a new metrics collector
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Increments a counter metric by 1
    pub async fn increment(&self, key: &str) {
        let mut counters = self.counters.write().await;
        *counters.entry(key.to_string()).or_insert(0) += 1;
        debug!("Incremented counter {}: {}", key, counters[key]);
    }

    /// Records a cache hit for the given source
    pub async fn record_cache_hit(&self, source: Source) {
        self.increment(&format!("cache.hit.{}", source)).await;
    }

    /// Records the outcome of one upstream fetch
    pub async fn record_fetch(&self, source: Source, status: FetchStatus) {
        let status_key = match status {
            FetchStatus::Success => "success",
            FetchStatus::Failed => "failed",
            FetchStatus::SkippedCircuitOpen => "skipped_circuit_open",
            FetchStatus::TimedOut => "timed_out",
            FetchStatus::RateLimited => "rate_limited",
        };
        self.increment(&format!("fetch.{}.{}", source, status_key))
            .await;
    }

    /// Records a timing metric
    pub async fn record_time(&self, key: &str, duration: Duration) {
        let mut timers = self.timers.write().await;
        timers.insert(key.to_string(), duration);
        debug!("Recorded timer {}: {:?}", key, duration);
    }

    /// Gets the current value of a counter metric
    pub async fn get_counter(&self, key: &str) -> Option<u64> {
        let counters = self.counters.read().await;
        counters.get(key).cloned()
    }

    /// Gets the current value of a timer metric
    pub async fn get_timer(&self, key: &str) -> Option<Duration> {
        let timers = self.timers.read().await;
        timers.get(key).cloned()
    }

    /// Logs a report of all collected metrics
    pub async fn report(&self) {
        info!("=== Metrics Report ===");

        let counters = self.counters.read().await;
        if !counters.is_empty() {
            info!("Counters:");
            let mut keys: Vec<_> = counters.keys().collect();
            keys.sort();
            for key in keys {
                info!("  {}: {}", key, counters[key]);
            }
        }

        let timers = self.timers.read().await;
        if !timers.is_empty() {
            info!("Timers:");
            let mut keys: Vec<_> = timers.keys().collect();
            keys.sort();
            for key in keys {
                info!("  {}: {:?}", key, timers[key]);
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
