//! Circuit breaker for the Router Client (§4.A).
//!
//! A rolling window of the last 16 outbound HTTP outcomes. Opens after 8
//! consecutive failures for 30s; half-open after that, closing on the next
//! success or doubling the open duration (up to 300s) on the next failure.
//! Pure state machine — no I/O, no wall-clock dependency beyond an injected
//! clock, so it is fully unit-testable without a live HTTP server.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_SIZE: usize = 16;
const OPEN_THRESHOLD: usize = 8;
const BASE_OPEN_DURATION: Duration = Duration::from_secs(30);
const MAX_OPEN_DURATION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    outcomes: VecDeque<bool>,
    state: BreakerState,
    opened_at: Option<Instant>,
    current_open_duration: Duration,
    openings: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(WINDOW_SIZE),
            state: BreakerState::Closed,
            opened_at: None,
            current_open_duration: BASE_OPEN_DURATION,
            openings: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn openings(&self) -> u64 {
        self.openings
    }

    /// Whether a call may proceed right now. Transitions `Open` -> `HalfOpen`
    /// once the open duration has elapsed.
    pub fn allow_call(&mut self) -> bool {
        self.allow_call_at(Instant::now())
    }

    pub fn allow_call_at(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let opened_at = self.opened_at.expect("open state always has opened_at");
                if now.duration_since(opened_at) >= self.current_open_duration {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.record_success_at(Instant::now());
    }

    pub fn record_success_at(&mut self, now: Instant) {
        self.push_outcome(true);
        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Closed;
                self.current_open_duration = BASE_OPEN_DURATION;
                self.opened_at = None;
            }
            BreakerState::Closed => {}
            BreakerState::Open => {
                // Shouldn't happen: allow_call gates calls while open.
                let _ = now;
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.push_outcome(false);
        match self.state {
            BreakerState::HalfOpen => {
                self.open_at(now, self.current_open_duration.saturating_mul(2).min(MAX_OPEN_DURATION));
            }
            BreakerState::Closed => {
                if self.consecutive_failures() >= OPEN_THRESHOLD {
                    self.open_at(now, BASE_OPEN_DURATION);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn open_at(&mut self, now: Instant, duration: Duration) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.current_open_duration = duration;
        self.openings += 1;
    }

    fn push_outcome(&mut self, success: bool) {
        if self.outcomes.len() == WINDOW_SIZE {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn consecutive_failures(&self) -> usize {
        self.outcomes.iter().rev().take_while(|&&ok| !ok).count()
    }
}
