//! Signal lifecycle tracking.
//!
//! ```text
//! CREATED -> VALIDATING -> ROUTED -> DISPATCHED -> ACKNOWLEDGED
//!                       |                      \-> FAILED -> RETRY -> DISPATCHED
//!                       |                                 \-> DEAD_LETTER
//!                       \-> REJECTED -> DEAD_LETTER
//! ```
//!
//! A gate 4 deferral is recorded as `RETRY` followed by a fresh `VALIDATING`.

use irrigation_domain::policy::AckPolicy;
use irrigation_types::{AuditRef, ConsumerId, GateVerdict, ReasonCode, Signal, SignalId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalState {
    Created,
    Validating,
    Routed,
    Dispatched,
    Acknowledged,
    Failed,
    Retry,
    DeadLetter,
    Rejected,
}

impl SignalState {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalState::Created => "CREATED",
            SignalState::Validating => "VALIDATING",
            SignalState::Routed => "ROUTED",
            SignalState::Dispatched => "DISPATCHED",
            SignalState::Acknowledged => "ACKNOWLEDGED",
            SignalState::Failed => "FAILED",
            SignalState::Retry => "RETRY",
            SignalState::DeadLetter => "DEAD_LETTER",
            SignalState::Rejected => "REJECTED",
        }
    }

    /// No later transition is recorded once a signal is here.
    pub fn is_terminal(self) -> bool {
        matches!(self, SignalState::Acknowledged | SignalState::DeadLetter)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub state: SignalState,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Progress of one consumer's copy of a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Queued,
    InFlight,
    Retrying,
    Acknowledged,
    DeadLettered,
    Expired,
}

impl DeliveryState {
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            DeliveryState::Queued | DeliveryState::InFlight | DeliveryState::Retrying
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsumerDelivery {
    pub consumer_id: ConsumerId,
    pub state: DeliveryState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalStatus {
    pub signal_id: SignalId,
    pub state: SignalState,
    /// Reason for a rejection or dead letter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
    pub history: Vec<Transition>,
    /// Verdicts from the most recent pass through the gate chain.
    pub gates: Vec<GateVerdict>,
    pub deliveries: Vec<ConsumerDelivery>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spilled: Vec<ConsumerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditRef>,
    /// Sequence numbers of dead-letter entries written for this signal.
    pub dead_letters: Vec<u64>,
    /// Nothing further will happen to this signal.
    pub settled: bool,
}

impl SignalStatus {
    pub fn states(&self) -> Vec<SignalState> {
        self.history.iter().map(|t| t.state).collect()
    }

    pub fn delivery(&self, consumer_id: &ConsumerId) -> Option<&ConsumerDelivery> {
        self.deliveries.iter().find(|d| &d.consumer_id == consumer_id)
    }
}

#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) signal: Arc<Signal>,
    pub(crate) status: SignalStatus,
    /// Set once the EXPIRED dead letter has been written.
    pub(crate) expired: bool,
    pub(crate) gate_retry_pending: bool,
    /// Claimed by the one `try_settle` call that writes the outcome record.
    pub(crate) settling: bool,
    pub(crate) dispatched_at: Option<Instant>,
}

impl Tracked {
    pub(crate) fn new(signal: Arc<Signal>, now: OffsetDateTime) -> Self {
        let status = SignalStatus {
            signal_id: signal.id().clone(),
            state: SignalState::Created,
            code: None,
            history: vec![Transition {
                state: SignalState::Created,
                at: now,
                detail: None,
            }],
            gates: Vec::new(),
            deliveries: Vec::new(),
            spilled: Vec::new(),
            audit: None,
            dead_letters: Vec::new(),
            settled: false,
        };
        Self {
            signal,
            status,
            expired: false,
            gate_retry_pending: false,
            settling: false,
            dispatched_at: None,
        }
    }

    /// Record a transition. Ignored (returns `false`) once the signal is terminal.
    pub(crate) fn transition(
        &mut self,
        state: SignalState,
        detail: Option<String>,
        now: OffsetDateTime,
    ) -> bool {
        if self.status.state.is_terminal() {
            return false;
        }
        self.status.state = state;
        self.status.history.push(Transition {
            state,
            at: now,
            detail,
        });
        true
    }

    pub(crate) fn delivery_mut(&mut self, consumer_id: &ConsumerId) -> Option<&mut ConsumerDelivery> {
        self.status
            .deliveries
            .iter_mut()
            .find(|d| &d.consumer_id == consumer_id)
    }

    pub(crate) fn pending(&self) -> usize {
        self.status
            .deliveries
            .iter()
            .filter(|d| d.state.is_pending())
            .count()
    }

    /// Fold per-consumer outcomes into the signal state under `policy`. Returns the states
    /// entered, with their details.
    pub(crate) fn settle_deliveries(
        &mut self,
        policy: AckPolicy,
        now: OffsetDateTime,
    ) -> Vec<(SignalState, Option<String>)> {
        let mut entered = Vec::new();
        if self.status.state.is_terminal() || self.status.deliveries.is_empty() {
            return entered;
        }
        let total = self.status.deliveries.len();
        let acked = self
            .status
            .deliveries
            .iter()
            .filter(|d| d.state == DeliveryState::Acknowledged)
            .count();
        let acknowledged = match policy {
            AckPolicy::Any => acked > 0,
            AckPolicy::All => acked == total,
        };
        if acknowledged {
            let detail = Some(format!("{acked} of {total} consumers acknowledged"));
            self.transition(SignalState::Acknowledged, detail.clone(), now);
            entered.push((SignalState::Acknowledged, detail));
        } else if self.pending() == 0 {
            let detail = Some(format!(
                "{acked} of {total} consumers acknowledged; ack policy {policy:?} not met"
            ));
            self.status.code = Some(ReasonCode::ConsumerFailure);
            self.transition(SignalState::Failed, detail.clone(), now);
            entered.push((SignalState::Failed, detail));
            self.transition(SignalState::DeadLetter, None, now);
            entered.push((SignalState::DeadLetter, None));
        }
        entered
    }

    pub(crate) fn ready_to_settle(&self) -> bool {
        !self.settling
            && !self.status.settled
            && self.status.state.is_terminal()
            && self.pending() == 0
            && !self.gate_retry_pending
    }
}

#[derive(Debug, Default)]
struct Signals {
    by_id: HashMap<SignalId, Tracked>,
    /// Settled ids, oldest first.
    settled: VecDeque<SignalId>,
}

/// Signals the orchestrator is tracking, keyed by id.
///
/// Unsettled signals are always kept. Once more than `retention` are settled, the oldest
/// settled ones are dropped as new signals arrive.
#[derive(Debug)]
pub(crate) struct StatusBoard {
    retention: usize,
    signals: Mutex<Signals>,
}

impl StatusBoard {
    pub(crate) fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            signals: Mutex::new(Signals::default()),
        }
    }

    /// Track a new signal. Returns `false` if the id is already tracked.
    pub(crate) fn insert(&self, tracked: Tracked) -> bool {
        let mut signals = self.signals.lock();
        if signals.by_id.contains_key(tracked.signal.id()) {
            return false;
        }
        while signals.settled.len() > self.retention {
            if let Some(oldest) = signals.settled.pop_front() {
                signals.by_id.remove(&oldest);
            }
        }
        signals.by_id.insert(tracked.signal.id().clone(), tracked);
        true
    }

    pub(crate) fn with<R>(&self, id: &SignalId, f: impl FnOnce(&mut Tracked) -> R) -> Option<R> {
        self.signals.lock().by_id.get_mut(id).map(f)
    }

    /// Mark a signal settled and queue it for eviction.
    pub(crate) fn mark_settled(&self, id: &SignalId) {
        let mut signals = self.signals.lock();
        let Some(t) = signals.by_id.get_mut(id) else {
            return;
        };
        if t.status.settled {
            return;
        }
        t.status.settled = true;
        signals.settled.push_back(id.clone());
    }

    pub(crate) fn snapshot(&self, id: &SignalId) -> Option<SignalStatus> {
        self.signals.lock().by_id.get(id).map(|t| t.status.clone())
    }
}
