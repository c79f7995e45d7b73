//! The scope registry: which scope instances exist and how questions nest.

use crate::policy::ScopePolicy;
use irrigation_types::{Scope, ScopeKind};

#[derive(Clone, Debug)]
pub struct ScopeRegistry {
    policy: ScopePolicy,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new(ScopePolicy::default())
    }
}

impl ScopeRegistry {
    pub fn new(policy: ScopePolicy) -> Self {
        Self { policy }
    }

    /// Number of instances of `kind`; valid indices are `1..=count`.
    pub fn count(&self, kind: ScopeKind) -> u16 {
        match kind {
            ScopeKind::Question => self.policy.questions,
            ScopeKind::PolicyArea => self.policy.policy_areas,
            ScopeKind::Dimension => self.policy.dimensions,
            ScopeKind::Cluster => self.policy.clusters,
        }
    }

    pub fn contains(&self, scope: &Scope) -> bool {
        scope.index >= 1 && scope.index <= self.count(scope.kind)
    }

    /// Parent policy area and dimension of a question.
    ///
    /// Questions are numbered policy-area-major: each policy area holds `dimensions` cells of
    /// `questions_per_cell` questions.
    pub fn question_parents(&self, question: &Scope) -> Option<(Scope, Scope)> {
        if question.kind != ScopeKind::Question || !self.contains(question) {
            return None;
        }
        let per_cell = self.policy.questions_per_cell;
        let per_area = self.policy.dimensions.checked_mul(per_cell)?;
        if per_area == 0 {
            return None;
        }
        let n = question.index - 1;
        let area = Scope::new(ScopeKind::PolicyArea, n / per_area + 1);
        let dimension = Scope::new(ScopeKind::Dimension, (n % per_area) / per_cell + 1);
        Some((area, dimension))
    }

    pub fn all(&self, kind: ScopeKind) -> impl Iterator<Item = Scope> {
        (1..=self.count(kind)).map(move |i| Scope::new(kind, i))
    }
}
