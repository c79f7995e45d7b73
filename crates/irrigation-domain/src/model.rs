use irrigation_types::{Capability, ConsumerId, HealthState, Scope, ScopeSelector, SignalType};
use std::collections::BTreeSet;

/// Point-in-time view of a registered consumer, as the capability gate sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerProfile {
    pub id: ConsumerId,
    /// Routing priority, higher first.
    pub priority: u8,
    pub signal_types: BTreeSet<SignalType>,
    pub capabilities: BTreeSet<Capability>,
    pub scopes: Vec<ScopeSelector>,
    pub health: HealthState,
}

impl ConsumerProfile {
    pub fn serves_any(&self, scopes: &[Scope]) -> bool {
        scopes
            .iter()
            .any(|scope| self.scopes.iter().any(|sel| sel.matches(scope)))
    }

    pub fn accepts(&self, signal_type: SignalType) -> bool {
        self.signal_types.contains(&signal_type)
            && self.capabilities.contains(&signal_type.required_capability())
    }
}

/// Queue occupancy of one consumer at gate 4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLoad {
    pub consumer_id: ConsumerId,
    pub depth: usize,
    pub capacity: usize,
}

/// Hash of one payload leaf (JSON pointer plus value).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey(pub String);
