//! Generic resilience primitives composed around each upstream client.
//!
//! Nothing in here knows about ingredients: each type is a plain wrapper
//! (token bucket, breaker state machine, permit pool, bounded TTL map,
//! backoff loop) owned by exactly one [`crate::sources::UpstreamClient`].

pub mod bulkhead;
pub mod cache;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use bulkhead::Bulkhead;
pub use cache::TtlCache;
pub use circuit_breaker::{BreakerSettings, BreakerState, CallPermit, CircuitBreaker};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
