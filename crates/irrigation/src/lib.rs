//! Public facade for embedding irrigation.
//!
//! Re-exports the crates a host needs to build an [`Orchestrator`], register consumers and
//! submit signals, so it only has to depend on this one.

#![forbid(unsafe_code)]

pub use irrigation_app as app;
pub use irrigation_domain as domain;
pub use irrigation_ledger as ledger;
pub use irrigation_registry as registry;
pub use irrigation_settings as settings;
pub use irrigation_types as types;

pub use irrigation_app::{
    AckingConsumer, Consumer, Delivery, Orchestrator, SignalEvent, SignalState, SignalStatus,
    SubmitError, SubmitReceipt, build_from_toml, build_orchestrator,
};
pub use irrigation_domain::policy::EffectiveConfig;
pub use irrigation_registry::{ConsumerRegistration, ConsumerTuning, RetryPolicy};
pub use irrigation_types::{ConsumerId, ReasonCode, ScopeSelector, Signal, SignalId, SignalType};
