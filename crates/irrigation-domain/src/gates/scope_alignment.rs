//! Gate 1: every target scope is well formed, exists, and nests consistently.

use super::GateFailure;
use crate::scopes::ScopeRegistry;
use irrigation_types::{ReasonCode, Scope, ScopeKind, Signal};
use std::collections::BTreeSet;

/// Returns the parsed scopes, in signal order, when every one of them is acceptable.
pub fn evaluate(signal: &Signal, registry: &ScopeRegistry) -> Result<Vec<Scope>, GateFailure> {
    let mut scopes = Vec::with_capacity(signal.target_scopes().len());
    for raw in signal.target_scopes() {
        let scope = Scope::parse(raw)
            .map_err(|e| GateFailure::new(ReasonCode::InvalidScopeFormat, e.to_string()))?;
        if !registry.contains(&scope) {
            return Err(GateFailure::new(
                ReasonCode::ScopeNotFound,
                format!(
                    "scope '{raw}' does not exist ({} range is 1..={})",
                    scope.kind.as_str(),
                    registry.count(scope.kind)
                ),
            ));
        }
        scopes.push(scope);
    }
    check_hierarchy(&scopes, registry)?;
    Ok(scopes)
}

/// If any policy area (dimension) is named, each question's parent must be one of them.
fn check_hierarchy(scopes: &[Scope], registry: &ScopeRegistry) -> Result<(), GateFailure> {
    let of_kind = |kind: ScopeKind| -> BTreeSet<Scope> {
        scopes.iter().filter(|s| s.kind == kind).copied().collect()
    };
    let areas = of_kind(ScopeKind::PolicyArea);
    let dimensions = of_kind(ScopeKind::Dimension);

    for question in scopes.iter().filter(|s| s.kind == ScopeKind::Question) {
        let Some((area, dimension)) = registry.question_parents(question) else {
            continue;
        };
        if !areas.is_empty() && !areas.contains(&area) {
            return Err(GateFailure::new(
                ReasonCode::ScopeHierarchyViolation,
                format!("{question} belongs to {area}, which is not among the target policy areas"),
            ));
        }
        if !dimensions.is_empty() && !dimensions.contains(&dimension) {
            return Err(GateFailure::new(
                ReasonCode::ScopeHierarchyViolation,
                format!(
                    "{question} belongs to {dimension}, which is not among the target dimensions"
                ),
            ));
        }
    }
    Ok(())
}
