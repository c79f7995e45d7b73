//! Signal distribution orchestrator and operator use cases.
//!
//! This crate provides the application layer: the orchestrator that runs signals through the
//! gate chain and fans them out to consumer lanes, the factory that builds one from config, and
//! the use cases behind the CLI.
//!
//! The CLI crate depends on this; it only handles argument parsing and I/O.

#![forbid(unsafe_code)]

mod breaker;
mod consumer;
mod events;
mod explain;
mod factory;
mod lane;
mod metrics;
mod operator;
mod orchestrator;
mod pipeline;
mod replay;
mod shared;
mod status;

pub use breaker::{BreakerState, CircuitBreaker, Permit};
pub use consumer::{AckingConsumer, Consumer, Delivery};
pub use events::SignalEvent;
pub use explain::{ExplainOutput, format_explanation, format_not_found, run_explain};
pub use factory::{Handlers, build_from_toml, build_orchestrator, load_config};
pub use metrics::{
    BucketCount, GateSnapshot, HistogramSnapshot, LATENCY_BUCKETS_US, MetricsSnapshot,
};
pub use operator::{
    AuditVerdict, CatalogRow, ConfigReport, ConsumerSummary, catalog_rows, format_catalog,
    format_dead_letters, list_dead_letters, purge_dead_letters, verify_audit,
};
pub use orchestrator::{ExpireError, Orchestrator, SubmitError, SubmitReceipt};
pub use replay::{
    ReplayInput, ReplayOutput, ReplaySignal, format_replay, parse_replay_signals, run_replay,
};
pub use status::{ConsumerDelivery, DeliveryState, SignalState, SignalStatus, Transition};
