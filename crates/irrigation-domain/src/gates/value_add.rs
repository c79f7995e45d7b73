//! Gate 2: does the signal add information for its scopes?
//!
//! The score combines how much of the payload is new for the target scopes with how dense the
//! payload is, plus a small bonus for fresh signals:
//!
//! `score = uniqueness_weight * uniqueness + density_weight * density (+ freshness_bonus)`
//!
//! clamped to `[0, 1]`.

use crate::fingerprint::{canonical_json, sha256_hex};
use crate::model::FactKey;
use crate::policy::ValueAddPolicy;
use irrigation_types::{Category, Signal};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDecision {
    Pass,
    /// Let through without applying the threshold.
    Bypass,
    Fail,
}

/// Structural measurements of a payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PayloadShape {
    pub leaves: usize,
    pub non_empty: usize,
    /// One key per non-empty leaf.
    pub facts: Vec<FactKey>,
}

impl PayloadShape {
    pub fn of(payload: &JsonValue) -> Self {
        let mut shape = PayloadShape::default();
        walk(payload, &mut String::new(), &mut shape);
        shape
    }

    pub fn density(&self, saturation: usize) -> f64 {
        if self.leaves == 0 {
            return 0.0;
        }
        let fill = self.non_empty as f64 / self.leaves as f64;
        let size = (self.leaves as f64 / saturation.max(1) as f64).min(1.0);
        fill * size
    }
}

fn walk(value: &JsonValue, pointer: &mut String, out: &mut PayloadShape) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
                walk(child, pointer, out);
                pointer.truncate(len);
            }
        }
        JsonValue::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&i.to_string());
                walk(child, pointer, out);
                pointer.truncate(len);
            }
        }
        leaf => {
            out.leaves += 1;
            if !is_empty_leaf(leaf) {
                out.non_empty += 1;
                out.facts.push(fact_key(pointer, leaf));
            }
        }
    }
}

fn is_empty_leaf(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}

fn fact_key(pointer: &str, value: &JsonValue) -> FactKey {
    let canonical = format!("{pointer}\u{0}{}", canonical_json(value));
    FactKey(sha256_hex(canonical.as_bytes()))
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueAssessment {
    pub score: f64,
    pub uniqueness: f64,
    pub density: f64,
    pub fresh: bool,
}

/// Score a payload given how many of its facts are new for the target scopes.
pub fn assess(
    signal: &Signal,
    shape: &PayloadShape,
    novel_facts: usize,
    policy: &ValueAddPolicy,
    now: OffsetDateTime,
) -> ValueAssessment {
    let uniqueness = if shape.facts.is_empty() {
        0.0
    } else {
        novel_facts.min(shape.facts.len()) as f64 / shape.facts.len() as f64
    };
    let density = shape.density(policy.density_saturation);
    let age_ms = signal.age_at(now).whole_milliseconds();
    let fresh = age_ms < policy.freshness_window.as_millis() as i128;

    let mut score = policy.uniqueness_weight * uniqueness + policy.density_weight * density;
    if fresh {
        score += policy.freshness_bonus;
    }
    ValueAssessment {
        score: score.clamp(0.0, 1.0),
        uniqueness,
        density,
        fresh,
    }
}

/// Apply bypass rules and the inclusive threshold to a computed score.
pub fn decide(signal: &Signal, score: f64, policy: &ValueAddPolicy) -> ValueDecision {
    if signal.signal_type().category() == Category::Enrichment || signal.metadata().bypass_value_gate
    {
        return ValueDecision::Bypass;
    }
    if score >= policy.threshold {
        ValueDecision::Pass
    } else {
        ValueDecision::Fail
    }
}
