use irrigation_types::{AuditRef, LedgerBody};
use thiserror::Error;

/// The audit write failed; nothing may be dispatched on the strength of it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("audit write failed: {0}")]
pub struct AuditWriteError(pub String);

/// Append-only, durable audit storage.
///
/// `append` must not return until the entry is durable.
pub trait AuditSink: Send + Sync {
    fn append(&self, body: LedgerBody) -> Result<AuditRef, AuditWriteError>;
}
