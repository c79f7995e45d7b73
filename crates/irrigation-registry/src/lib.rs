//! Consumer registry.
//!
//! Registrations are immutable once accepted; only health changes afterwards.

#![forbid(unsafe_code)]

mod registration;
mod registry;

pub use registration::{ConsumerRegistration, ConsumerTuning, RetryPolicy};
pub use registry::{ConsumerRegistry, HealthReport, RegistryError};
