//! Pure signal validation (no IO).
//!
//! Input: a signal plus a [`GateContext`] that exposes registry, state and audit seams.
//! Output: per-gate verdicts and a routing outcome.

#![forbid(unsafe_code)]

pub mod audit;
pub mod fingerprint;
pub mod model;
pub mod policy;
pub mod scopes;
pub mod state;

mod engine;
pub mod gates;

pub use audit::{AuditSink, AuditWriteError};
pub use engine::{ChainOutcome, ChainReport, GateContext, evaluate, rejection_record};

#[cfg(test)]
mod proptest;
#[cfg(test)]
mod test_support;
