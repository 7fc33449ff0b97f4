//! Per-adapter circuit breaker.
//!
//! `CLOSED → OPEN` after `fail_threshold` consecutive failures;
//! `OPEN → HALF_OPEN` after `reset_timeout_s`; `HALF_OPEN → CLOSED` after
//! `half_open_successes` successful probes. A half-open failure reopens.

use lattice_config::CircuitSection;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow; failures are counted.
    Closed,
    /// Requests fail fast.
    Open,
    /// Probing: limited requests allowed.
    HalfOpen,
}

/// Circuit breaker for one adapter.
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    fail_threshold: u32,
    reset_timeout: Duration,
    required_successes: u32,
}

impl CircuitBreaker {
    /// Create a breaker from config.
    #[must_use]
    pub fn new(config: &CircuitSection) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            fail_threshold: config.fail_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_s),
            required_successes: config.half_open_successes,
        }
    }

    /// Current state, advancing OPEN → HALF_OPEN when the reset timeout
    /// has elapsed.
    pub fn state(&mut self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened) = self.opened_at {
                if now.duration_since(opened) >= self.reset_timeout {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    info!("circuit half-open, probing");
                }
            }
        }
        self.state
    }

    /// Whether a request may pass right now.
    pub fn allow(&mut self, now: Instant) -> bool {
        self.state(now) != CircuitState::Open
    }

    /// Record a successful call.
    pub fn on_success(&mut self) {
        match self.state {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.required_successes {
                    self.state = CircuitState::Closed;
                    self.consecutive_failures = 0;
                    self.opened_at = None;
                    info!("circuit closed");
                }
            },
            CircuitState::Open => {},
        }
    }

    /// Record a failed call.
    pub fn on_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.fail_threshold {
                    self.trip(now);
                }
            },
            CircuitState::HalfOpen => self.trip(now),
            CircuitState::Open => {},
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        warn!("circuit opened");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(&CircuitSection::default())
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let mut b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.on_failure(now);
        }
        assert_eq!(b.state(now), CircuitState::Closed);
        b.on_failure(now);
        assert_eq!(b.state(now), CircuitState::Open);
        assert!(!b.allow(now));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.on_failure(now);
        }
        b.on_success();
        for _ in 0..4 {
            b.on_failure(now);
        }
        assert_eq!(b.state(now), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let mut b = breaker();
        let start = Instant::now();
        for _ in 0..5 {
            b.on_failure(start);
        }
        let later = start + Duration::from_secs(30);
        assert_eq!(b.state(later), CircuitState::HalfOpen);
        assert!(b.allow(later));
    }

    #[test]
    fn test_half_open_closes_after_required_successes() {
        let mut b = breaker();
        let start = Instant::now();
        for _ in 0..5 {
            b.on_failure(start);
        }
        let later = start + Duration::from_secs(30);
        b.state(later);
        b.on_success();
        assert_eq!(b.state(later), CircuitState::HalfOpen);
        b.on_success();
        assert_eq!(b.state(later), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut b = breaker();
        let start = Instant::now();
        for _ in 0..5 {
            b.on_failure(start);
        }
        let later = start + Duration::from_secs(30);
        b.state(later);
        b.on_failure(later);
        assert_eq!(b.state(later), CircuitState::Open);
        // And the reset timer restarts from the new failure.
        assert_eq!(b.state(later + Duration::from_secs(29)), CircuitState::Open);
        assert_eq!(
            b.state(later + Duration::from_secs(30)),
            CircuitState::HalfOpen
        );
    }
}
