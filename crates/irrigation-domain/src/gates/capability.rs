//! Gate 3: find every live consumer able to act on the signal.

use super::GateFailure;
use crate::model::ConsumerProfile;
use irrigation_types::{ConsumerId, ReasonCode, Scope, Signal};

/// Eligible consumers, highest priority first, ties broken by id.
pub fn evaluate(
    signal: &Signal,
    scopes: &[Scope],
    candidates: &[ConsumerProfile],
) -> Result<Vec<ConsumerId>, GateFailure> {
    let signal_type = signal.signal_type();
    if !signal_type.is_legal_source_phase(signal.source_phase()) {
        return Err(GateFailure::new(
            ReasonCode::NoCapableConsumer,
            format!(
                "{signal_type} may not be emitted from phase {} (legal: {:?})",
                signal.source_phase(),
                signal_type.legal_source_phases()
            ),
        ));
    }

    let mut eligible: Vec<&ConsumerProfile> = candidates
        .iter()
        .filter(|c| c.accepts(signal_type))
        .filter(|c| c.serves_any(scopes))
        .filter(|c| c.health.accepts_dispatch())
        .collect();

    if eligible.is_empty() {
        return Err(GateFailure::new(
            ReasonCode::NoCapableConsumer,
            format!(
                "no healthy consumer accepts {signal_type} with capability {} for the target scopes",
                signal_type.required_capability()
            ),
        ));
    }

    eligible.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    Ok(eligible.into_iter().map(|c| c.id.clone()).collect())
}
