//! Circuit breaker for the geolocation dependency.
//!
//! State machine: Closed → Open → HalfOpen → Closed
//!
//! - **Closed**: normal operation; consecutive failures are counted.
//! - **Open**: the dependency is considered down; `check` rejects immediately
//!   until `recovery_timeout` has elapsed.
//! - **HalfOpen**: trial calls are allowed through again.
//!   - `success_threshold` consecutive successes → Closed (counters reset)
//!   - any failure → Open (timer restarts)

use crate::config::BreakerConfig;
use parking_lot::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Returned by [`CircuitBreaker::check`] when the breaker is not admitting calls.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("circuit breaker is open")]
pub struct BreakerOpen;

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Check whether a call is allowed through.
    ///
    /// In the Open state the first check after `recovery_timeout` transitions
    /// to HalfOpen; from then on trial calls pass until their recorded
    /// outcomes either close or reopen the breaker.
    pub fn check(&self) -> Result<(), BreakerOpen> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                if let Some(opened_at) = inner.opened_at
                    && opened_at.elapsed() >= self.config.recovery_timeout()
                {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_successes = 0;
                    tracing::info!("circuit breaker: Open -> HalfOpen (trial calls allowed)");
                    return Ok(());
                }
                Err(BreakerOpen)
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                    tracing::info!("circuit breaker: HalfOpen -> Closed (recovered)");
                }
            }
            BreakerState::Closed => {
                inner.consecutive_successes += 1;
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;

        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        consecutive_failures = inner.consecutive_failures,
                        "circuit breaker: Closed -> Open (failure threshold reached)"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker: HalfOpen -> Open (trial call failed)");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}
