//! Durable, append-only stores: the hash-chained audit ledger and the dead-letter sink.
//!
//! Both are plain JSONL files. Nothing is ever rewritten; purging dead letters appends a
//! tombstone record.

#![forbid(unsafe_code)]

mod audit;
mod dead_letter;
mod error;
mod jsonl;

pub use audit::{
    ChainViolation, FileAuditLedger, GENESIS_HASH, MemoryAuditLedger, entry_hash, verify_chain,
    verify_file, verify_lines,
};
pub use dead_letter::{
    DeadLetter, DeadLetterRecord, DeadLetterStore, FileDeadLetters, MemoryDeadLetters,
    PurgeSelection, Tombstone,
};
pub use error::LedgerError;

/// Audit ledger file name inside a data directory.
pub const AUDIT_FILE: &str = "audit.jsonl";
/// Dead-letter file name inside a data directory.
pub const DEAD_LETTER_FILE: &str = "dead_letters.jsonl";
