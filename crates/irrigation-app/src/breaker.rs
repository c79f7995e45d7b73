//! Per-consumer circuit breaker.
//!
//! `Closed` counts consecutive failures and opens at the threshold. `Open` refuses attempts
//! until the cooldown has passed, then lets exactly one probe through (`HalfOpen`). The probe's
//! result closes or re-opens the circuit.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Whether an attempt may contact the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permit {
    Allowed,
    /// The single trial attempt after a cooldown.
    Probe,
    /// Circuit open: nack without contacting the consumer.
    Denied,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn try_acquire(&mut self, now: Instant) -> Permit {
        match self.state {
            BreakerState::Closed => Permit::Allowed,
            BreakerState::Open => {
                let cooled = self
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.cooldown);
                if cooled {
                    self.state = BreakerState::HalfOpen;
                    self.probe_in_flight = true;
                    Permit::Probe
                } else {
                    Permit::Denied
                }
            }
            BreakerState::HalfOpen if self.probe_in_flight => Permit::Denied,
            BreakerState::HalfOpen => {
                self.probe_in_flight = true;
                Permit::Probe
            }
        }
    }

    /// Returns the new state if the call changed it.
    pub fn record_success(&mut self) -> Option<BreakerState> {
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
        self.opened_at = None;
        self.transition(BreakerState::Closed)
    }

    /// Returns the new state if the call changed it.
    pub fn record_failure(&mut self, now: Instant) -> Option<BreakerState> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.probe_in_flight = false;
        let reopen = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.consecutive_failures >= self.threshold,
            BreakerState::Open => false,
        };
        if !reopen {
            return None;
        }
        self.opened_at = Some(now);
        self.transition(BreakerState::Open)
    }

    fn transition(&mut self, next: BreakerState) -> Option<BreakerState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}
