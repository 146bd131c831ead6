//! Per-upstream clients and the uniform resilience pipeline around them.
//!
//! Each concrete client implements [`SourceClient`]: one raw network
//! interaction returning a source-specific payload map. [`UpstreamClient`]
//! wraps a client with its own cache, rate limiter, bulkhead, circuit
//! breaker and retry budget, and exposes the single never-failing operation
//! the aggregator consumes.

pub mod cosing;
pub mod ewg;
pub mod fda;
pub mod inci;
pub mod ollama;
pub mod pubchem;

pub use cosing::CosingClient;
pub use ewg::EwgClient;
pub use fda::FdaClient;
pub use inci::InciClient;
pub use ollama::OllamaClient;
pub use pubchem::PubChemClient;

use crate::config::UpstreamTuning;
use crate::error::AnalysisError;
use crate::metrics::Metrics;
use crate::model::{FetchStatus, IngredientQuery, Source, UpstreamResult, UserSafetyProfile};
use crate::resilience::{
    with_retry, Bulkhead, CallPermit, CircuitBreaker, BreakerSettings, RateLimiter, RetryPolicy,
    TtlCache,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One raw network interaction with an upstream source
///
/// Implementations translate an ingredient name into the source's request
/// shape and the response into an opaque payload map. They return errors
/// freely; the pipeline above them decides what to absorb, retry or cache.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which provider this client talks to
    fn source(&self) -> Source;

    /// Fetches the source-specific payload for one ingredient
    async fn fetch_payload(
        &self,
        name: &str,
        profile: Option<&UserSafetyProfile>,
    ) -> crate::error::Result<Map<String, Value>>;
}

/// A [`SourceClient`] composed with its resilience state
///
/// All the per-upstream mutable state lives here, owned by this instance
/// and injectable for tests. `fetch` never returns an error and never
/// panics: every outcome is data in the returned [`UpstreamResult`].
pub struct UpstreamClient {
    inner: Arc<dyn SourceClient>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    bulkhead: Bulkhead,
    cache: TtlCache<Map<String, Value>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl UpstreamClient {
    /// Wraps a source client with fresh resilience state per the tuning
    pub fn new(
        inner: Arc<dyn SourceClient>,
        tuning: &UpstreamTuning,
        metrics: Arc<Metrics>,
    ) -> Self {
        let name = inner.source().name();
        Self {
            limiter: RateLimiter::new(tuning.permits_per_minute),
            breaker: CircuitBreaker::new(
                name,
                BreakerSettings {
                    failure_threshold: tuning.failure_threshold,
                    failure_rate_threshold: tuning.failure_rate_threshold,
                    min_samples: tuning.min_samples,
                    window: tuning.window(),
                    cooldown: tuning.cooldown(),
                    half_open_trials: tuning.half_open_trials,
                },
            ),
            bulkhead: Bulkhead::new(
                name,
                tuning.bulkhead_permits,
                Duration::from_millis(tuning.bulkhead_wait_ms),
            ),
            cache: TtlCache::new(tuning.cache_capacity, tuning.cache_ttl()),
            retry: RetryPolicy::new(
                tuning.max_attempts,
                Duration::from_millis(tuning.retry_base_delay_ms),
            ),
            call_timeout: tuning.call_timeout(),
            inner,
            metrics,
        }
    }

    /// The provider this client wraps
    pub fn source(&self) -> Source {
        self.inner.source()
    }

    /// Fetches one ingredient through the full resilience pipeline
    ///
    /// Cache hit short-circuits everything else. Otherwise: rate limiter
    /// (fail-fast), bulkhead, circuit breaker, then the timed network call
    /// with its retry budget. One breaker outcome is recorded per pipeline
    /// pass, after retries are exhausted.
    pub async fn fetch(&self, query: &IngredientQuery) -> UpstreamResult {
        let source = self.source();
        let key = query.cache_key();

        if let Some(payload) = self.cache.get(&key).await {
            debug!("{}: cache hit for '{}'", source, query.name);
            self.metrics.record_cache_hit(source).await;
            return UpstreamResult::success(source, payload);
        }

        if !self.limiter.try_acquire().await {
            debug!("{}: rate limited for '{}'", source, query.name);
            return self.unavailable(source, FetchStatus::RateLimited).await;
        }

        let _permit = match self.bulkhead.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("{}: {}", source, e);
                return self.unavailable(source, FetchStatus::Failed).await;
            }
        };

        match self.breaker.check().await {
            CallPermit::Denied => {
                debug!("{}: circuit open, skipping '{}'", source, query.name);
                return self
                    .unavailable(source, FetchStatus::SkippedCircuitOpen)
                    .await;
            }
            CallPermit::Allowed | CallPermit::AllowedTrial => {}
        }

        let outcome = with_retry(&self.retry, || async {
            match timeout(
                self.call_timeout,
                self.inner.fetch_payload(&query.name, query.profile.as_ref()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout(format!(
                    "{}: no answer within {:?}",
                    source, self.call_timeout
                ))),
            }
        })
        .await;

        match outcome {
            Ok(payload) => {
                self.breaker.record_success().await;
                self.cache.insert(&key, payload.clone()).await;
                self.metrics.record_fetch(source, FetchStatus::Success).await;
                UpstreamResult::success(source, payload)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                warn!("{}: fetch for '{}' failed: {}", source, query.name, e);
                let status = match e {
                    AnalysisError::Timeout(_) => FetchStatus::TimedOut,
                    _ => FetchStatus::Failed,
                };
                self.unavailable(source, status).await
            }
        }
    }

    async fn unavailable(&self, source: Source, status: FetchStatus) -> UpstreamResult {
        self.metrics.record_fetch(source, status).await;
        UpstreamResult::unavailable(source, status)
    }
}
