use crate::registry::RegistryError;
use irrigation_domain::model::ConsumerProfile;
use irrigation_types::{Capability, ConsumerId, HealthState, ScopeSelector, SignalType};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Duration;

pub const PRIORITY_RANGE: RangeInclusive<u8> = 0..=10;
pub const MAX_CONCURRENT_RANGE: RangeInclusive<u32> = 1..=64;
pub const TIMEOUT_RANGE: RangeInclusive<Duration> =
    Duration::from_millis(1)..=Duration::from_secs(300);
pub const QUEUE_CAPACITY_RANGE: RangeInclusive<usize> = 1..=10_000;
pub const MAX_RETRIES_RANGE: RangeInclusive<u32> = 0..=10;
pub const MULTIPLIER_RANGE: RangeInclusive<f64> = 1.0..=10.0;

/// Per-consumer delivery retry schedule.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsumerTuning {
    pub priority: u8,
    pub max_concurrent: u32,
    pub timeout: Duration,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Keep contact fresh from the delivery lane while the consumer is healthy or degraded.
    /// Off by default: consumers report through heartbeats.
    pub self_heartbeat: bool,
}

impl Default for ConsumerTuning {
    fn default() -> Self {
        Self {
            priority: 5,
            max_concurrent: 4,
            timeout: Duration::from_secs(5),
            queue_capacity: 256,
            retry: RetryPolicy::default(),
            self_heartbeat: false,
        }
    }
}

/// Declarative description of a consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerRegistration {
    pub consumer_id: ConsumerId,
    pub phase: u8,
    pub scopes: Vec<ScopeSelector>,
    pub capabilities: BTreeSet<Capability>,
    pub signal_types: BTreeSet<SignalType>,
    pub tuning: ConsumerTuning,
}

impl ConsumerRegistration {
    /// Registration for the consumer of `phase` with default tuning and nothing declared.
    pub fn for_phase(phase: u8) -> Result<Self, RegistryError> {
        let consumer_id = ConsumerId::for_phase(phase)
            .map_err(|e| RegistryError::InvalidRegistration(e.to_string()))?;
        Ok(Self {
            consumer_id,
            phase,
            scopes: Vec::new(),
            capabilities: BTreeSet::new(),
            signal_types: BTreeSet::new(),
            tuning: ConsumerTuning::default(),
        })
    }

    pub fn accepting(mut self, types: impl IntoIterator<Item = SignalType>) -> Self {
        for t in types {
            self.signal_types.insert(t);
            self.capabilities.insert(t.required_capability());
        }
        self
    }

    pub fn serving(mut self, scopes: impl IntoIterator<Item = ScopeSelector>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    pub fn with_tuning(mut self, tuning: ConsumerTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.consumer_id.phase() != self.phase {
            return Err(RegistryError::InvalidRegistration(format!(
                "consumer id {} does not match declared phase {}",
                self.consumer_id, self.phase
            )));
        }
        if self.signal_types.is_empty() {
            return Err(RegistryError::InvalidRegistration(format!(
                "{} declares no accepted signal types",
                self.consumer_id
            )));
        }
        if self.scopes.is_empty() {
            return Err(RegistryError::InvalidRegistration(format!(
                "{} declares no scopes",
                self.consumer_id
            )));
        }
        for t in &self.signal_types {
            let needed = t.required_capability();
            if !self.capabilities.contains(&needed) {
                return Err(RegistryError::MissingCapability {
                    consumer_id: self.consumer_id.clone(),
                    signal_type: *t,
                    capability: needed,
                });
            }
        }
        self.validate_tuning()
    }

    fn validate_tuning(&self) -> Result<(), RegistryError> {
        let t = &self.tuning;
        check_bound("priority", &t.priority, &PRIORITY_RANGE)?;
        check_bound("max_concurrent", &t.max_concurrent, &MAX_CONCURRENT_RANGE)?;
        check_bound("timeout", &t.timeout, &TIMEOUT_RANGE)?;
        check_bound("queue_capacity", &t.queue_capacity, &QUEUE_CAPACITY_RANGE)?;
        check_bound("retry.max_retries", &t.retry.max_retries, &MAX_RETRIES_RANGE)?;
        check_bound("retry.multiplier", &t.retry.multiplier, &MULTIPLIER_RANGE)?;
        if t.retry.initial_backoff > t.retry.max_backoff {
            return Err(RegistryError::OutOfBounds {
                field: "retry.initial_backoff",
                detail: format!(
                    "{:?} exceeds retry.max_backoff {:?}",
                    t.retry.initial_backoff, t.retry.max_backoff
                ),
            });
        }
        Ok(())
    }

    pub fn profile(&self, health: HealthState) -> ConsumerProfile {
        ConsumerProfile {
            id: self.consumer_id.clone(),
            priority: self.tuning.priority,
            signal_types: self.signal_types.clone(),
            capabilities: self.capabilities.clone(),
            scopes: self.scopes.clone(),
            health,
        }
    }
}

fn check_bound<T>(
    field: &'static str,
    value: &T,
    range: &RangeInclusive<T>,
) -> Result<(), RegistryError>
where
    T: PartialOrd + std::fmt::Debug,
{
    if range.contains(value) {
        return Ok(());
    }
    Err(RegistryError::OutOfBounds {
        field,
        detail: format!(
            "{value:?} is outside {:?}..={:?}",
            range.start(),
            range.end()
        ),
    })
}
