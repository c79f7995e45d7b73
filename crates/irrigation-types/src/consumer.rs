use crate::catalog::MAX_PHASE;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("consumer id '{0}' must be 'phase-N' with N in 0..=9")]
pub struct ConsumerIdError(pub String);

/// Stable consumer identifier, tied one-to-one to a pipeline phase (`phase-4`).
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId {
    phase: u8,
}

impl ConsumerId {
    pub fn for_phase(phase: u8) -> Result<Self, ConsumerIdError> {
        if phase > MAX_PHASE {
            return Err(ConsumerIdError(format!("phase-{phase}")));
        }
        Ok(Self { phase })
    }

    pub fn parse(raw: &str) -> Result<Self, ConsumerIdError> {
        let digits = raw
            .strip_prefix("phase-")
            .ok_or_else(|| ConsumerIdError(raw.to_string()))?;
        if digits.len() != 1 {
            return Err(ConsumerIdError(raw.to_string()));
        }
        let phase = digits
            .parse::<u8>()
            .map_err(|_| ConsumerIdError(raw.to_string()))?;
        Self::for_phase(phase).map_err(|_| ConsumerIdError(raw.to_string()))
    }

    pub fn phase(&self) -> u8 {
        self.phase
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase-{}", self.phase)
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = ConsumerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ConsumerId::parse(&value)
    }
}

impl From<ConsumerId> for String {
    fn from(value: ConsumerId) -> Self {
        value.to_string()
    }
}

/// Consumer health lifecycle.
///
/// `Registered -> Healthy <-> Degraded <-> Unhealthy -> Deregistered`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Registered,
    Healthy,
    Degraded,
    Unhealthy,
    Deregistered,
}

impl HealthState {
    /// Whether the capability gate may route to a consumer in this state.
    pub fn accepts_dispatch(self) -> bool {
        matches!(self, HealthState::Healthy | HealthState::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Registered => "REGISTERED",
            HealthState::Healthy => "HEALTHY",
            HealthState::Degraded => "DEGRADED",
            HealthState::Unhealthy => "UNHEALTHY",
            HealthState::Deregistered => "DEREGISTERED",
        }
    }
}
