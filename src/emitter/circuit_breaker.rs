//! Rolling-window circuit breaker.
//!
//! Closed: outcomes fill a window of the last `request_volume_threshold`
//! attempts. Once the window is full and its failure share reaches
//! `failure_ratio`, the breaker opens. Open: every call is refused until
//! `delay` has elapsed. Half-open: exactly one probe is admitted; its success
//! closes the breaker, its failure opens it again.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Permission to make one call. Hand it back to
/// [`CircuitBreaker::record`] with the call's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Probe,
}

/// How one admitted call ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    /// The call never reached the broker; it says nothing about its health.
    Neutral,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    state: State,
    window: VecDeque<bool>,
}

pub struct CircuitBreaker {
    threshold: usize,
    failure_ratio: f64,
    delay: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        let threshold = config.request_volume_threshold.max(1);
        Self {
            threshold,
            failure_ratio: config.failure_ratio.clamp(0.0, 1.0),
            delay: config.delay(),
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::with_capacity(threshold),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> BreakerState {
        match self.lock().state {
            State::Closed => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Ask to make a call. `None` means the breaker refuses it.
    pub fn try_acquire(&self) -> Option<Admission> {
        let mut inner = self.lock();
        let current = inner.state;
        match current {
            State::Closed => Some(Admission::Normal),
            State::Open { until } if Instant::now() >= until => {
                inner.state = State::HalfOpen {
                    probe_in_flight: true,
                };
                info!("Circuit breaker half-open, admitting probe");
                Some(Admission::Probe)
            }
            State::Open { .. } => None,
            State::HalfOpen {
                probe_in_flight: false,
            } => {
                inner.state = State::HalfOpen {
                    probe_in_flight: true,
                };
                Some(Admission::Probe)
            }
            State::HalfOpen {
                probe_in_flight: true,
            } => None,
        }
    }

    /// Report how an admitted call ended.
    pub fn record(&self, admission: Admission, outcome: CallOutcome) {
        let mut inner = self.lock();
        match (admission, outcome) {
            (Admission::Probe, CallOutcome::Success) => {
                inner.state = State::Closed;
                inner.window.clear();
                info!("Circuit breaker closed");
            }
            (Admission::Probe, CallOutcome::Failure) => {
                self.open(&mut inner);
            }
            (Admission::Probe, CallOutcome::Neutral) => {
                inner.state = State::HalfOpen {
                    probe_in_flight: false,
                };
            }
            (Admission::Normal, CallOutcome::Neutral) => {}
            (Admission::Normal, outcome) => {
                // Calls admitted before the breaker opened may finish late.
                if !matches!(inner.state, State::Closed) {
                    return;
                }
                if inner.window.len() == self.threshold {
                    inner.window.pop_front();
                }
                inner.window.push_back(outcome == CallOutcome::Failure);

                if inner.window.len() == self.threshold {
                    let failures = inner.window.iter().filter(|failed| **failed).count();
                    if failures as f64 / self.threshold as f64 >= self.failure_ratio {
                        self.open(&mut inner);
                    }
                }
            }
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = State::Open {
            until: Instant::now() + self.delay,
        };
        inner.window.clear();
        warn!(delay = ?self.delay, "Circuit breaker opened");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: usize) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            request_volume_threshold: threshold,
            failure_ratio: 0.5,
            delay_ms: 500,
        })
    }

    fn call(breaker: &CircuitBreaker, outcome: CallOutcome) {
        let admission = breaker.try_acquire().unwrap();
        breaker.record(admission, outcome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_until_window_full() {
        let breaker = breaker(4);
        for _ in 0..3 {
            call(&breaker, CallOutcome::Failure);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        call(&breaker, CallOutcome::Failure);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_failure_ratio() {
        let breaker = breaker(4);
        call(&breaker, CallOutcome::Success);
        call(&breaker, CallOutcome::Success);
        call(&breaker, CallOutcome::Failure);
        call(&breaker, CallOutcome::Failure);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls() {
        let breaker = breaker(4);
        call(&breaker, CallOutcome::Failure);
        for _ in 0..6 {
            call(&breaker, CallOutcome::Success);
        }
        call(&breaker, CallOutcome::Failure);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_outcomes_do_not_count() {
        let breaker = breaker(2);
        for _ in 0..5 {
            call(&breaker, CallOutcome::Neutral);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_after_delay() {
        let breaker = breaker(2);
        call(&breaker, CallOutcome::Failure);
        call(&breaker, CallOutcome::Failure);

        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(breaker.try_acquire().is_none());

        tokio::time::advance(Duration::from_millis(1)).await;
        let probe = breaker.try_acquire();
        assert_eq!(probe, Some(Admission::Probe));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        breaker.record(Admission::Probe, CallOutcome::Success);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let breaker = breaker(2);
        call(&breaker, CallOutcome::Failure);
        call(&breaker, CallOutcome::Failure);

        tokio::time::advance(Duration::from_millis(500)).await;
        call(&breaker, CallOutcome::Failure);

        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_probe_releases_slot() {
        let breaker = breaker(2);
        call(&breaker, CallOutcome::Failure);
        call(&breaker, CallOutcome::Failure);

        tokio::time::advance(Duration::from_millis(500)).await;
        call(&breaker, CallOutcome::Neutral);

        assert_eq!(breaker.try_acquire(), Some(Admission::Probe));
    }
}
