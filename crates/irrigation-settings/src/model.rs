use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `irrigation.toml` schema v1.
///
/// This is a *user-facing* config model: every field is optional so a file only states what it
/// changes relative to the selected profile. Durations are integer milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IrrigationConfigV1 {
    /// Optional schema string for tooling (`irrigation.config.v1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Preset profile: `standard` (default), `strict` or `lenient`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default)]
    pub value_add: ValueAddConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub scopes: ScopesConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Declarative consumer registrations, matched to handlers by id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ConsumerConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValueAddConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueness_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_bonus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density_saturation: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts_per_scope: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_window_ms: Option<u64>,
    /// `0` disables the global rate limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_burst: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_channel_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_initial_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_max_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DispatchConfig {
    /// `any` or `all`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_cooldown_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
    /// Settled signal statuses kept in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_retention: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegistryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_max_age_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScopesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_areas: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_per_cell: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// Directory holding `audit.jsonl` and `dead_letters.jsonl`. Unset keeps both in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsumerConfig {
    /// `phase-N`.
    pub id: String,

    /// Defaults to the phase encoded in `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u8>,

    /// Catalog wire names, e.g. `SCORING_PRIMARY`.
    #[serde(default)]
    pub signal_types: Vec<String>,

    /// Capability tokens. Defaults to the capabilities the accepted types require.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Exact scopes (`PA02`) or kind wildcards (`Q*`).
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// In-process consumers: refresh contact from the delivery lane instead of heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_heartbeat: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
}
