use crate::registration::ConsumerRegistration;
use irrigation_domain::model::ConsumerProfile;
use irrigation_domain::policy::RegistryPolicy;
use irrigation_types::{Capability, ConsumerId, HealthState, SignalType};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum RegistryError {
    #[error("consumer {0} is already registered")]
    AlreadyRegistered(ConsumerId),
    #[error("consumer {0} is not registered")]
    NotFound(ConsumerId),
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
    #[error("{consumer_id} accepts {signal_type} but does not declare capability {capability}")]
    MissingCapability {
        consumer_id: ConsumerId,
        signal_type: SignalType,
        capability: Capability,
    },
    #[error("{field} out of bounds: {detail}")]
    OutOfBounds { field: &'static str, detail: String },
    #[error("cannot report {requested:?} for {consumer_id}")]
    InvalidTransition {
        consumer_id: ConsumerId,
        requested: HealthState,
    },
}

/// Result of a pull health check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub consumer_id: ConsumerId,
    pub state: HealthState,
    /// Time since the last heartbeat, or since registration if none arrived yet.
    pub heartbeat_age: Duration,
}

#[derive(Debug)]
struct Health {
    state: HealthState,
    last_contact: Instant,
}

#[derive(Debug)]
struct Entry {
    registration: Arc<ConsumerRegistration>,
    health: Mutex<Health>,
}

impl Entry {
    /// Apply the heartbeat-age rule and return the resulting state.
    fn observe(&self, now: Instant, max_age: Duration) -> (HealthState, Duration) {
        let mut health = self.health.lock();
        let age = now.saturating_duration_since(health.last_contact);
        if age > max_age && matches!(health.state, HealthState::Healthy | HealthState::Degraded) {
            warn!(
                consumer_id = %self.registration.consumer_id,
                age_ms = age.as_millis() as u64,
                "heartbeat expired; marking consumer unhealthy"
            );
            health.state = HealthState::Unhealthy;
        }
        (health.state, age)
    }
}

/// Registered consumers keyed by id.
///
/// The map lock is held only to look entries up; each entry's health has its own lock.
#[derive(Debug)]
pub struct ConsumerRegistry {
    policy: RegistryPolicy,
    entries: RwLock<BTreeMap<ConsumerId, Arc<Entry>>>,
}

impl ConsumerRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, registration: ConsumerRegistration) -> Result<ConsumerId, RegistryError> {
        self.register_at(registration, Instant::now())
    }

    pub fn register_at(
        &self,
        registration: ConsumerRegistration,
        now: Instant,
    ) -> Result<ConsumerId, RegistryError> {
        registration.validate()?;
        let id = registration.consumer_id.clone();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        info!(
            consumer_id = %id,
            signal_types = registration.signal_types.len(),
            priority = registration.tuning.priority,
            "consumer registered"
        );
        entries.insert(
            id.clone(),
            Arc::new(Entry {
                registration: Arc::new(registration),
                health: Mutex::new(Health {
                    state: HealthState::Registered,
                    last_contact: now,
                }),
            }),
        );
        Ok(id)
    }

    /// Remove a consumer. Its final state is `Deregistered`.
    pub fn deregister(&self, id: &ConsumerId) -> Result<Arc<ConsumerRegistration>, RegistryError> {
        let entry = self
            .entries
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entry.health.lock().state = HealthState::Deregistered;
        info!(consumer_id = %id, "consumer deregistered");
        Ok(entry.registration.clone())
    }

    pub fn get(&self, id: &ConsumerId) -> Option<Arc<ConsumerRegistration>> {
        self.entries.read().get(id).map(|e| e.registration.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ids(&self) -> Vec<ConsumerId> {
        self.entries.read().keys().cloned().collect()
    }

    /// Consumers declaring `signal_type`, with health as of `now`.
    pub fn find_by_signal_type(&self, signal_type: SignalType) -> Vec<ConsumerProfile> {
        self.find_by_signal_type_at(signal_type, Instant::now())
    }

    pub fn find_by_signal_type_at(
        &self,
        signal_type: SignalType,
        now: Instant,
    ) -> Vec<ConsumerProfile> {
        let matching: Vec<Arc<Entry>> = self
            .entries
            .read()
            .values()
            .filter(|e| e.registration.signal_types.contains(&signal_type))
            .cloned()
            .collect();
        matching
            .iter()
            .map(|e| {
                let (state, _) = e.observe(now, self.policy.heartbeat_max_age);
                e.registration.profile(state)
            })
            .collect()
    }

    /// The consumer registered for `phase`, if any.
    pub fn find_by_phase(&self, phase: u8) -> Option<ConsumerProfile> {
        self.find_by_phase_at(phase, Instant::now())
    }

    pub fn find_by_phase_at(&self, phase: u8, now: Instant) -> Option<ConsumerProfile> {
        let id = ConsumerId::for_phase(phase).ok()?;
        let entry = self.entries.read().get(&id).cloned()?;
        let (state, _) = entry.observe(now, self.policy.heartbeat_max_age);
        Some(entry.registration.profile(state))
    }

    pub fn health_check(&self, id: &ConsumerId) -> Result<HealthReport, RegistryError> {
        self.health_check_at(id, Instant::now())
    }

    pub fn health_check_at(
        &self,
        id: &ConsumerId,
        now: Instant,
    ) -> Result<HealthReport, RegistryError> {
        let entry = self.entry(id)?;
        let (state, heartbeat_age) = entry.observe(now, self.policy.heartbeat_max_age);
        Ok(HealthReport {
            consumer_id: id.clone(),
            state,
            heartbeat_age,
        })
    }

    /// Push a health report (heartbeat). Returns the state actually entered.
    ///
    /// An unhealthy consumer reporting healthy is moved to degraded first.
    pub fn update_health(
        &self,
        id: &ConsumerId,
        reported: HealthState,
    ) -> Result<HealthState, RegistryError> {
        self.update_health_at(id, reported, Instant::now())
    }

    pub fn update_health_at(
        &self,
        id: &ConsumerId,
        reported: HealthState,
        now: Instant,
    ) -> Result<HealthState, RegistryError> {
        if matches!(reported, HealthState::Registered | HealthState::Deregistered) {
            return Err(RegistryError::InvalidTransition {
                consumer_id: id.clone(),
                requested: reported,
            });
        }
        let entry = self.entry(id)?;
        let mut health = entry.health.lock();
        let next = match (health.state, reported) {
            (HealthState::Unhealthy, HealthState::Healthy) => HealthState::Degraded,
            (_, r) => r,
        };
        if next != health.state {
            info!(
                consumer_id = %id,
                from = health.state.as_str(),
                to = next.as_str(),
                "consumer health changed"
            );
        }
        health.state = next;
        health.last_contact = now;
        Ok(next)
    }

    /// Refresh contact for a consumer that is still healthy or degraded.
    ///
    /// Never changes the state: an unhealthy consumer stays unhealthy until it reports in
    /// through [`Self::update_health`]. Returns the current state.
    pub fn keep_alive(&self, id: &ConsumerId) -> Result<HealthState, RegistryError> {
        self.keep_alive_at(id, Instant::now())
    }

    pub fn keep_alive_at(&self, id: &ConsumerId, now: Instant) -> Result<HealthState, RegistryError> {
        let entry = self.entry(id)?;
        let (state, _) = entry.observe(now, self.policy.heartbeat_max_age);
        if matches!(state, HealthState::Healthy | HealthState::Degraded) {
            entry.health.lock().last_contact = now;
        }
        Ok(state)
    }

    fn entry(&self, id: &ConsumerId) -> Result<Arc<Entry>, RegistryError> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }
}
