use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally
    Closed,
    /// Calls are denied until the cool-down elapses
    Open,
    /// A bounded number of trial calls probe the upstream
    HalfOpen,
}

/// Decision returned by [`CircuitBreaker::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    /// Proceed with the call
    Allowed,
    /// Proceed; this call is one of the half-open trials
    AllowedTrial,
    /// Skip the call, the breaker is open
    Denied,
}

/// Settings for one breaker instance
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Failure percentage over the window that opens the breaker
    pub failure_rate_threshold: f64,
    /// Minimum window samples before the rate check applies
    pub min_samples: u32,
    /// Sliding window for the rate check
    pub window: Duration,
    /// OPEN to HALF_OPEN cool-down
    pub cooldown: Duration,
    /// Trial calls admitted while HALF_OPEN
    pub half_open_trials: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 50.0,
            min_samples: 10,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(45),
            half_open_trials: 3,
        }
    }
}

/// Three-state circuit breaker for one upstream source
///
/// Opens on a run of consecutive failures or on a high failure rate within
/// a sliding window; cools down into HALF_OPEN where a bounded number of
/// trial calls decide between closing again and re-opening.
pub struct CircuitBreaker {
    name: &'static str,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    // (when, failed) outcomes inside the sliding window
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trials_admitted: u32,
    trials_succeeded: u32,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given settings
    pub fn new(name: &'static str, settings: BreakerSettings) -> Self {
        Self {
            name,
            settings,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                outcomes: VecDeque::new(),
                opened_at: None,
                trials_admitted: 0,
                trials_succeeded: 0,
            }),
        }
    }

    /// Decides whether a call may proceed, transitioning OPEN to HALF_OPEN
    /// once the cool-down has elapsed
    pub async fn check(&self) -> CallPermit {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => CallPermit::Allowed,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.settings.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    debug!("breaker {}: cool-down elapsed, going half-open", self.name);
                    inner.state = BreakerState::HalfOpen;
                    inner.trials_admitted = 1;
                    inner.trials_succeeded = 0;
                    CallPermit::AllowedTrial
                } else {
                    CallPermit::Denied
                }
            }
            BreakerState::HalfOpen => {
                if inner.trials_admitted < self.settings.half_open_trials {
                    inner.trials_admitted += 1;
                    CallPermit::AllowedTrial
                } else {
                    CallPermit::Denied
                }
            }
        }
    }

    /// Records a successful call
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.consecutive_failures = 0;
        inner.outcomes.push_back((now, false));
        self.prune_window(&mut inner, now);

        if inner.state == BreakerState::HalfOpen {
            inner.trials_succeeded += 1;
            if inner.trials_succeeded >= self.settings.half_open_trials {
                debug!("breaker {}: trials succeeded, closing", self.name);
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
                inner.outcomes.clear();
            }
        }
    }

    /// Records a failed call, opening the breaker when a threshold trips
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.consecutive_failures += 1;
        inner.outcomes.push_back((now, true));
        self.prune_window(&mut inner, now);

        match inner.state {
            BreakerState::HalfOpen => {
                warn!("breaker {}: trial call failed, re-opening", self.name);
                Self::open(&mut inner, now);
            }
            BreakerState::Closed => {
                if self.should_trip(&inner) {
                    warn!(
                        "breaker {}: opening after {} consecutive failures",
                        self.name, inner.consecutive_failures
                    );
                    Self::open(&mut inner, now);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state, for diagnostics and tests
    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    fn open(inner: &mut BreakerInner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        inner.trials_admitted = 0;
        inner.trials_succeeded = 0;
    }

    fn should_trip(&self, inner: &BreakerInner) -> bool {
        if inner.consecutive_failures >= self.settings.failure_threshold {
            return true;
        }
        let samples = inner.outcomes.len() as u32;
        if samples >= self.settings.min_samples {
            let failures = inner.outcomes.iter().filter(|(_, failed)| *failed).count();
            let rate = failures as f64 / f64::from(samples) * 100.0;
            return rate >= self.settings.failure_rate_threshold;
        }
        false
    }

    fn prune_window(&self, inner: &mut BreakerInner, now: Instant) {
        let window = self.settings.window;
        while let Some((at, _)) = inner.outcomes.front() {
            if now.duration_since(*at) >= window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }
}
