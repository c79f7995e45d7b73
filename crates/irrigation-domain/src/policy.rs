use serde::Serialize;
use std::time::Duration;

/// How many consumer acknowledgements settle a fanned-out signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// One acknowledgement suffices.
    #[default]
    Any,
    /// Every targeted consumer must acknowledge.
    All,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueAddPolicy {
    /// Minimum score to pass, inclusive.
    pub threshold: f64,
    pub uniqueness_weight: f64,
    pub density_weight: f64,
    pub freshness_bonus: f64,
    pub freshness_window: Duration,
    /// Leaf count at which the density term stops growing.
    pub density_saturation: usize,
    /// Delivered facts remembered per scope for the uniqueness term.
    pub facts_per_scope: usize,
}

impl Default for ValueAddPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.30,
            uniqueness_weight: 0.6,
            density_weight: 0.4,
            freshness_bonus: 0.1,
            freshness_window: Duration::from_secs(30),
            density_saturation: 8,
            facts_per_scope: 4096,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelPolicy {
    pub dedup_window: Duration,
    /// Sustained global rate. `0` disables rate limiting.
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: u32,
    /// Fraction of queue capacity at which low-priority signals are held back.
    pub high_water_ratio: f64,
    /// Gate 4 re-attempts for retryable channel codes before they become terminal.
    pub max_channel_retries: u32,
    pub retry_backoff_initial: Duration,
    pub retry_backoff_max: Duration,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(60),
            rate_limit_per_sec: 100.0,
            rate_limit_burst: 200,
            high_water_ratio: 0.8,
            max_channel_retries: 3,
            retry_backoff_initial: Duration::from_millis(100),
            retry_backoff_max: Duration::from_secs(5),
        }
    }
}

impl ChannelPolicy {
    /// Exponential delay before channel retry `attempt` (1-based), capped at the maximum.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.retry_backoff_initial
            .saturating_mul(1u32 << exp)
            .min(self.retry_backoff_max)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchPolicy {
    pub ack_policy: AckPolicy,
    /// Consecutive failures that open a consumer's circuit.
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown: Duration,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_buffer: usize,
    /// Settled signal statuses kept for `get_status`. The oldest settled are dropped first.
    pub status_retention: usize,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            ack_policy: AckPolicy::Any,
            circuit_failure_threshold: 5,
            circuit_cooldown: Duration::from_secs(30),
            event_buffer: 1024,
            status_retention: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegistryPolicy {
    /// Heartbeat silence after which a live consumer is marked unhealthy.
    pub heartbeat_max_age: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            heartbeat_max_age: Duration::from_secs(60),
        }
    }
}

/// Scope instance counts and the question layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScopePolicy {
    pub questions: u16,
    pub policy_areas: u16,
    pub dimensions: u16,
    pub clusters: u16,
    /// Questions per (policy area, dimension) cell.
    pub questions_per_cell: u16,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            questions: 300,
            policy_areas: 10,
            dimensions: 6,
            clusters: 4,
            questions_per_cell: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub profile: String,
    pub version: u32,
    pub value_add: ValueAddPolicy,
    pub channel: ChannelPolicy,
    pub dispatch: DispatchPolicy,
    pub registry: RegistryPolicy,
    pub scopes: ScopePolicy,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            profile: "standard".to_string(),
            version: irrigation_types::ids::CONFIG_VERSION,
            value_add: ValueAddPolicy::default(),
            channel: ChannelPolicy::default(),
            dispatch: DispatchPolicy::default(),
            registry: RegistryPolicy::default(),
            scopes: ScopePolicy::default(),
        }
    }
}
