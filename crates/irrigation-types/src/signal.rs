//! The signal envelope.
//!
//! A [`Signal`] is immutable once built. Derived signals reference their parent through
//! `parent_signal_id`; nothing is ever edited in place.

use crate::catalog::{MAX_PHASE, SignalType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Lifetime applied when the producer does not set one.
pub const DEFAULT_TTL: Duration = Duration::minutes(5);

#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    pub fn generate() -> Self {
        SignalId(format!("sig-{}", Uuid::new_v4()))
    }

    pub fn new<S: Into<String>>(s: S) -> Self {
        SignalId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// High and critical signals may spill to a secondary consumer under backpressure.
    pub fn may_spill(self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignalMetadata {
    pub trace_id: String,
    pub correlation_id: String,
    /// Identity of the producing stage or component.
    pub creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_signal_id: Option<SignalId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Forces the value-add gate to bypass its threshold.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypass_value_gate: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("signal must target at least one scope")]
    NoScopes,
    #[error("source phase {0} is outside 0..={MAX_PHASE}")]
    PhaseOutOfRange(u8),
    #[error("expires_at must be later than created_at")]
    ExpiresBeforeCreated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "SignalParts")]
pub struct Signal {
    signal_id: SignalId,
    signal_type: SignalType,
    source_phase: u8,
    target_scopes: Vec<String>,
    payload: JsonValue,
    metadata: SignalMetadata,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

/// Unvalidated field bag used when reading a signal back from storage.
#[derive(Deserialize, JsonSchema)]
struct SignalParts {
    signal_id: SignalId,
    signal_type: SignalType,
    source_phase: u8,
    target_scopes: Vec<String>,
    payload: JsonValue,
    metadata: SignalMetadata,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

impl TryFrom<SignalParts> for Signal {
    type Error = SignalError;

    fn try_from(p: SignalParts) -> Result<Self, Self::Error> {
        validate(p.source_phase, &p.target_scopes, p.created_at, p.expires_at)?;
        Ok(Signal {
            signal_id: p.signal_id,
            signal_type: p.signal_type,
            source_phase: p.source_phase,
            target_scopes: dedup_preserving_order(p.target_scopes),
            payload: p.payload,
            metadata: p.metadata,
            created_at: p.created_at,
            expires_at: p.expires_at,
        })
    }
}

fn validate(
    phase: u8,
    scopes: &[String],
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
) -> Result<(), SignalError> {
    if scopes.is_empty() {
        return Err(SignalError::NoScopes);
    }
    if phase > MAX_PHASE {
        return Err(SignalError::PhaseOutOfRange(phase));
    }
    if expires_at <= created_at {
        return Err(SignalError::ExpiresBeforeCreated);
    }
    Ok(())
}

fn dedup_preserving_order(scopes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(scopes.len());
    for s in scopes {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

impl Signal {
    pub fn builder(signal_type: SignalType, source_phase: u8) -> SignalBuilder {
        SignalBuilder::new(signal_type, source_phase)
    }

    /// Start a signal derived from `parent`: lineage and trace context are inherited.
    pub fn derive(parent: &Signal, signal_type: SignalType, source_phase: u8) -> SignalBuilder {
        let mut b = SignalBuilder::new(signal_type, source_phase);
        b.metadata.trace_id = parent.metadata.trace_id.clone();
        b.metadata.correlation_id = parent.metadata.correlation_id.clone();
        b.metadata.parent_signal_id = Some(parent.signal_id.clone());
        b.metadata.priority = parent.metadata.priority;
        b
    }

    pub fn id(&self) -> &SignalId {
        &self.signal_id
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn source_phase(&self) -> u8 {
        self.source_phase
    }

    pub fn target_scopes(&self) -> &[String] {
        &self.target_scopes
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn metadata(&self) -> &SignalMetadata {
        &self.metadata
    }

    pub fn priority(&self) -> Priority {
        self.metadata.priority
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    pub fn age_at(&self, now: OffsetDateTime) -> Duration {
        now - self.created_at
    }
}

pub struct SignalBuilder {
    signal_id: Option<SignalId>,
    signal_type: SignalType,
    source_phase: u8,
    target_scopes: Vec<String>,
    payload: JsonValue,
    metadata: SignalMetadata,
    created_at: Option<OffsetDateTime>,
    expires_at: Option<OffsetDateTime>,
    ttl: Duration,
}

impl SignalBuilder {
    fn new(signal_type: SignalType, source_phase: u8) -> Self {
        let trace = Uuid::new_v4().simple().to_string();
        Self {
            signal_id: None,
            signal_type,
            source_phase,
            target_scopes: Vec::new(),
            payload: JsonValue::Null,
            metadata: SignalMetadata {
                trace_id: trace.clone(),
                correlation_id: trace,
                creator: format!("phase-{source_phase}"),
                parent_signal_id: None,
                priority: Priority::Normal,
                tags: BTreeMap::new(),
                bypass_value_gate: false,
            },
            created_at: None,
            expires_at: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the generated id. Intended for replaying stored signals.
    pub fn id(mut self, id: SignalId) -> Self {
        self.signal_id = Some(id);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.target_scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.metadata.creator = creator.into();
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.metadata.trace_id = trace_id.into();
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = correlation_id.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.tags.insert(key.into(), value.into());
        self
    }

    pub fn bypass_value_gate(mut self, bypass: bool) -> Self {
        self.metadata.bypass_value_gate = bypass;
        self
    }

    pub fn created_at(mut self, at: OffsetDateTime) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> Result<Signal, SignalError> {
        let created_at = self.created_at.unwrap_or_else(OffsetDateTime::now_utc);
        let expires_at = self.expires_at.unwrap_or(created_at + self.ttl);
        validate(
            self.source_phase,
            &self.target_scopes,
            created_at,
            expires_at,
        )?;
        Ok(Signal {
            signal_id: self.signal_id.unwrap_or_else(SignalId::generate),
            signal_type: self.signal_type,
            source_phase: self.source_phase,
            target_scopes: dedup_preserving_order(self.target_scopes),
            payload: self.payload,
            metadata: self.metadata,
            created_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scoring() -> SignalBuilder {
        Signal::builder(SignalType::ScoringPrimary, 4).scopes(["Q042", "PA02", "D3"])
    }

    #[test]
    fn build_assigns_id_and_default_ttl() {
        let s = scoring().build().unwrap();
        assert!(s.id().as_str().starts_with("sig-"));
        assert_eq!(s.expires_at() - s.created_at(), DEFAULT_TTL);
        assert_eq!(s.metadata().creator, "phase-4");
    }

    #[test]
    fn scopes_are_deduplicated_in_order() {
        let s = scoring().scope("Q042").scope("CL01").build().unwrap();
        assert_eq!(s.target_scopes(), ["Q042", "PA02", "D3", "CL01"]);
    }

    #[test]
    fn empty_scopes_are_rejected() {
        let err = Signal::builder(SignalType::ScoringPrimary, 4)
            .build()
            .unwrap_err();
        assert_eq!(err, SignalError::NoScopes);
    }

    #[test]
    fn phase_above_nine_is_rejected() {
        let err = Signal::builder(SignalType::ReportFinal, 10)
            .scope("PA01")
            .build()
            .unwrap_err();
        assert_eq!(err, SignalError::PhaseOutOfRange(10));
    }

    #[test]
    fn expiry_must_follow_creation() {
        let now = OffsetDateTime::now_utc();
        let err = scoring()
            .created_at(now)
            .expires_at(now)
            .build()
            .unwrap_err();
        assert_eq!(err, SignalError::ExpiresBeforeCreated);
    }

    #[test]
    fn derive_links_parent_and_inherits_trace() {
        let parent = scoring().priority(Priority::High).build().unwrap();
        let child = Signal::derive(&parent, SignalType::ScoringAdjustment, 5)
            .scope("Q042")
            .build()
            .unwrap();
        assert_eq!(child.metadata().parent_signal_id.as_ref(), Some(parent.id()));
        assert_eq!(child.metadata().trace_id, parent.metadata().trace_id);
        assert_eq!(child.priority(), Priority::High);
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn deserialize_applies_construction_rules() {
        let s = scoring().payload(json!({"score": 0.7})).build().unwrap();
        let text = serde_json::to_string(&s).unwrap();
        let back: Signal = serde_json::from_str(&text).unwrap();
        assert_eq!(back, s);

        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["target_scopes"] = json!([]);
        assert!(serde_json::from_value::<Signal>(value).is_err());
    }
}
