//! Durable record shapes: audit ledger bodies and dead-letter entries.
//!
//! These are the only things the core persists. Both stores are append-only.

use crate::catalog::SignalType;
use crate::consumer::ConsumerId;
use crate::reason::{Gate, ReasonCode, Stage};
use crate::signal::{Signal, SignalId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Outcome of one gate for one signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GateVerdict {
    pub gate: Gate,
    pub passed: bool,
    /// Set when the value-add gate let the signal through without applying its threshold.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypassed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_us: u64,
}

/// What the irrigation channel decided for a signal that reached it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ChannelDecision {
    Authorized {
        consumers: Vec<ConsumerId>,
        /// Eligible consumers skipped under backpressure in favour of the ones above.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        spilled: Vec<ConsumerId>,
    },
    Rejected {
        code: ReasonCode,
    },
}

/// One entry per signal that reaches gate 4, written before any dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditRecord {
    pub signal_id: SignalId,
    pub signal_type: SignalType,
    pub source_phase: u8,
    pub target_scopes: Vec<String>,
    pub gates: Vec<GateVerdict>,
    pub decision: ChannelDecision,
    pub validation_latency_us: u64,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConsumerOutcome {
    pub consumer_id: ConsumerId,
    pub acknowledged: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Appended once dispatch for an authorized signal has finished.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DispatchOutcomeRecord {
    pub signal_id: SignalId,
    /// Ledger sequence number of the authorizing [`AuditRecord`].
    pub authorization_seq: u64,
    pub acknowledged: bool,
    pub deliveries: Vec<ConsumerOutcome>,
    pub dispatch_latency_us: u64,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerBody {
    Authorization(AuditRecord),
    Outcome(DispatchOutcomeRecord),
}

impl LedgerBody {
    pub fn signal_id(&self) -> &SignalId {
        match self {
            LedgerBody::Authorization(r) => &r.signal_id,
            LedgerBody::Outcome(r) => &r.signal_id,
        }
    }
}

/// A hash-chained ledger line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    pub seq: u64,
    pub prev_hash: String,
    pub hash: String,
    pub body: LedgerBody,
}

/// Pointer to a written ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditRef {
    pub seq: u64,
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeadLetterEntry {
    pub seq: u64,
    pub signal: Signal,
    pub stage: Stage,
    pub code: ReasonCode,
    /// Set when only one consumer's copy was dead-lettered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<ConsumerId>,
    pub detail: String,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub dead_lettered_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_decision_is_tagged() {
        let d = ChannelDecision::Authorized {
            consumers: vec![ConsumerId::for_phase(4).unwrap()],
            spilled: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!({"decision": "authorized", "consumers": ["phase-4"]})
        );
        let r = ChannelDecision::Rejected {
            code: ReasonCode::DuplicateSignal,
        };
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"decision": "rejected", "code": "DUPLICATE_SIGNAL"})
        );
    }
}
