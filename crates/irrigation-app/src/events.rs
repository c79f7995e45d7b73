use crate::breaker::BreakerState;
use crate::status::SignalState;
use irrigation_types::{ConsumerId, ReasonCode, SignalId};
use serde::Serialize;

/// Lifecycle notifications published on the orchestrator's broadcast channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SignalEvent {
    StateChanged {
        signal_id: SignalId,
        state: SignalState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Delivered {
        signal_id: SignalId,
        consumer_id: ConsumerId,
        attempts: u32,
    },
    DeliveryFailed {
        signal_id: SignalId,
        consumer_id: ConsumerId,
        attempt: u32,
        error: String,
    },
    DeadLettered {
        signal_id: SignalId,
        seq: u64,
        code: ReasonCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        consumer_id: Option<ConsumerId>,
    },
    /// Nothing further will happen to this signal.
    Settled {
        signal_id: SignalId,
        state: SignalState,
    },
    CircuitChanged {
        consumer_id: ConsumerId,
        state: BreakerState,
    },
    /// Escalation: the audit ledger refused a write.
    AuditFailure {
        signal_id: SignalId,
        detail: String,
    },
    /// Escalation: the dead-letter sink refused a write, so the failure has no entry.
    DeadLetterFailure {
        signal_id: SignalId,
        code: ReasonCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        consumer_id: Option<ConsumerId>,
        detail: String,
    },
}

impl SignalEvent {
    pub fn signal_id(&self) -> Option<&SignalId> {
        match self {
            SignalEvent::StateChanged { signal_id, .. }
            | SignalEvent::Delivered { signal_id, .. }
            | SignalEvent::DeliveryFailed { signal_id, .. }
            | SignalEvent::DeadLettered { signal_id, .. }
            | SignalEvent::Settled { signal_id, .. }
            | SignalEvent::AuditFailure { signal_id, .. }
            | SignalEvent::DeadLetterFailure { signal_id, .. } => Some(signal_id),
            SignalEvent::CircuitChanged { .. } => None,
        }
    }
}
