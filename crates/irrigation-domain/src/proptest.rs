//! Property-based tests for the domain crate.
//!
//! These tests use proptest to verify invariants around:
//! - Scope alignment soundness and idempotence
//! - Value-add score bounds and threshold monotonicity
//! - Fingerprint stability
//! - Strict gate ordering

use crate::engine::{ChainOutcome, evaluate};
use crate::fingerprint::signal_fingerprint;
use crate::gates::scope_alignment;
use crate::gates::value_add::{self, PayloadShape, ValueDecision};
use crate::policy::ValueAddPolicy;
use crate::scopes::ScopeRegistry;
use crate::test_support::{FakeContext, all_types, profile};
use irrigation_types::{Category, Gate, Scope, Signal, SignalType};
use proptest::prelude::*;
use serde_json::{Map, Value as JsonValue};

// ============================================================================
// Strategies for generating arbitrary values
// ============================================================================

/// Scope strings that are always format-valid, in or out of the default ranges.
fn arb_formatted_scope() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u16..=999).prop_map(|n| format!("Q{n:03}")),
        (0u16..=99).prop_map(|n| format!("PA{n:02}")),
        (0u16..=9).prop_map(|n| format!("D{n}")),
        (0u16..=99).prop_map(|n| format!("CL{n:02}")),
    ]
}

/// Arbitrary scope-ish strings, mostly malformed.
fn arb_raw_scope() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_formatted_scope(),
        prop::string::string_regex("[A-Za-z]{0,3}[0-9]{0,4}").unwrap(),
    ]
}

fn arb_scopes() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_raw_scope(), 1..6)
}

fn arb_signal_type() -> impl Strategy<Value = SignalType> {
    prop::sample::select(SignalType::ALL.to_vec())
}

fn arb_json() -> impl Strategy<Value = JsonValue> {
    let leaf = prop_oneof![
        Just(JsonValue::Null),
        any::<bool>().prop_map(JsonValue::Bool),
        any::<i64>().prop_map(JsonValue::from),
        prop::string::string_regex("[a-z ]{0,8}")
            .unwrap()
            .prop_map(JsonValue::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(JsonValue::Array),
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|m| JsonValue::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn signal_with(signal_type: SignalType, scopes: Vec<String>, payload: JsonValue) -> Signal {
    let phase = signal_type.legal_source_phases()[0];
    Signal::builder(signal_type, phase)
        .scopes(scopes)
        .payload(payload)
        .build()
        .unwrap()
}

// ============================================================================
// Gate 1
// ============================================================================

proptest! {
    #[test]
    fn scope_alignment_is_idempotent(scopes in arb_scopes()) {
        let registry = ScopeRegistry::default();
        let s = signal_with(SignalType::ScoringPrimary, scopes, JsonValue::Null);
        let a = scope_alignment::evaluate(&s, &registry);
        let b = scope_alignment::evaluate(&s, &registry);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn scope_alignment_pass_implies_every_scope_exists(scopes in arb_scopes()) {
        let registry = ScopeRegistry::default();
        let s = signal_with(SignalType::ScoringPrimary, scopes, JsonValue::Null);
        if let Ok(parsed) = scope_alignment::evaluate(&s, &registry) {
            prop_assert_eq!(parsed.len(), s.target_scopes().len());
            for (raw, scope) in s.target_scopes().iter().zip(&parsed) {
                prop_assert!(registry.contains(scope));
                prop_assert_eq!(&scope.to_string(), raw);
            }
        }
    }

    #[test]
    fn one_unknown_scope_fails_the_signal(
        scopes in prop::collection::vec(arb_formatted_scope(), 0..4),
        bad in 301u16..=999,
    ) {
        let registry = ScopeRegistry::default();
        let mut all = scopes;
        all.push(format!("Q{bad:03}"));
        let s = signal_with(SignalType::ScoringPrimary, all, JsonValue::Null);
        prop_assert!(scope_alignment::evaluate(&s, &registry).is_err());
    }

    #[test]
    fn question_with_own_parents_is_consistent(n in 1u16..=300) {
        let registry = ScopeRegistry::default();
        let q = Scope::new(irrigation_types::ScopeKind::Question, n);
        let (pa, d) = registry.question_parents(&q).unwrap();
        let s = signal_with(
            SignalType::ScoringPrimary,
            vec![q.to_string(), pa.to_string(), d.to_string()],
            JsonValue::Null,
        );
        prop_assert!(scope_alignment::evaluate(&s, &registry).is_ok());
    }
}

// ============================================================================
// Gate 2
// ============================================================================

proptest! {
    #[test]
    fn value_score_stays_in_unit_interval(payload in arb_json(), novel in 0usize..32) {
        let policy = ValueAddPolicy::default();
        let s = signal_with(SignalType::ScoringPrimary, vec!["Q042".into()], payload);
        let shape = PayloadShape::of(s.payload());
        let a = value_add::assess(&s, &shape, novel, &policy, s.created_at());
        prop_assert!((0.0..=1.0).contains(&a.score));
        prop_assert!((0.0..=1.0).contains(&a.uniqueness));
        prop_assert!((0.0..=1.0).contains(&a.density));
    }

    #[test]
    fn decision_follows_threshold_unless_bypassed(
        signal_type in arb_signal_type(),
        score in 0.0f64..=1.0,
    ) {
        let policy = ValueAddPolicy::default();
        let s = signal_with(signal_type, vec!["Q042".into()], JsonValue::Null);
        let decision = value_add::decide(&s, score, &policy);
        if signal_type.category() == Category::Enrichment {
            prop_assert_eq!(decision, ValueDecision::Bypass);
        } else if score >= policy.threshold {
            prop_assert_eq!(decision, ValueDecision::Pass);
        } else {
            prop_assert_eq!(decision, ValueDecision::Fail);
        }
    }

    #[test]
    fn fingerprint_ignores_key_insertion_order(
        entries in prop::collection::btree_map("[a-f]{1,3}", any::<i32>(), 1..6),
    ) {
        let forward: Map<String, JsonValue> =
            entries.iter().map(|(k, v)| (k.clone(), JsonValue::from(*v))).collect();
        let reverse: Map<String, JsonValue> =
            entries.iter().rev().map(|(k, v)| (k.clone(), JsonValue::from(*v))).collect();
        let a = signal_with(SignalType::ScoringPrimary, vec!["Q042".into()], JsonValue::Object(forward));
        let b = signal_with(SignalType::ScoringPrimary, vec!["Q042".into()], JsonValue::Object(reverse));
        prop_assert_eq!(signal_fingerprint(&a), signal_fingerprint(&b));
    }
}

// ============================================================================
// Chain ordering
// ============================================================================

proptest! {
    #[test]
    fn failing_gate_is_always_the_last_one_invoked(
        signal_type in arb_signal_type(),
        scopes in arb_scopes(),
        payload in arb_json(),
    ) {
        let consumer = {
            let mut p = profile(4, &[], &["Q*", "PA*", "D*", "CL*"]);
            p.signal_types = all_types();
            p.capabilities = p.signal_types.iter().map(|t| t.required_capability()).collect();
            p
        };
        let ctx = FakeContext::with_consumers(vec![consumer]);
        let s = signal_with(signal_type, scopes, payload);
        let report = evaluate(&s, &ctx, s.created_at());

        let gates: Vec<Gate> = report.verdicts.iter().map(|v| v.gate).collect();
        prop_assert_eq!(&gates[..], &Gate::ORDER[..gates.len()]);
        let (last, earlier) = report.verdicts.split_last().unwrap();
        prop_assert!(earlier.iter().all(|v| v.passed));
        match &report.outcome {
            ChainOutcome::Authorized { .. } => prop_assert!(last.passed && gates.len() == 4),
            ChainOutcome::Rejected { gate, .. } => {
                prop_assert!(!last.passed);
                prop_assert_eq!(*gate, last.gate);
            }
            ChainOutcome::Deferred { .. } => prop_assert_eq!(last.gate, Gate::IrrigationChannel),
        }
    }
}
