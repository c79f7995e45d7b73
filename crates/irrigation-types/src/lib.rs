//! Stable DTOs and IDs used across the irrigation workspace.
//!
//! This crate is intentionally boring:
//! - the signal envelope and its closed catalog
//! - scope identifiers and consumer selectors
//! - reason codes and the explain registry
//! - ledger and dead-letter record shapes

#![forbid(unsafe_code)]

pub mod catalog;
pub mod consumer;
pub mod explain;
pub mod ids;
pub mod reason;
pub mod record;
pub mod scope;
pub mod signal;

pub use catalog::{Capability, Category, MAX_PHASE, SignalType};
pub use consumer::{ConsumerId, ConsumerIdError, HealthState};
pub use explain::{ExamplePair, Explanation, lookup_explanation};
pub use reason::{Gate, ReasonCode, Stage};
pub use record::{
    AuditRecord, AuditRef, ChannelDecision, ConsumerOutcome, DeadLetterEntry,
    DispatchOutcomeRecord, GateVerdict, LedgerBody, LedgerEntry,
};
pub use scope::{Scope, ScopeFormatError, ScopeKind, ScopeSelector};
pub use signal::{
    DEFAULT_TTL, Priority, Signal, SignalBuilder, SignalError, SignalId, SignalMetadata,
};
