//! Hash-chained audit ledger.
//!
//! Each line is a [`LedgerEntry`]: `hash = sha256(prev_hash || canonical_json(body))`. The first
//! entry chains from [`GENESIS_HASH`].

use crate::error::LedgerError;
use crate::jsonl::{JsonlFile, read_all};
use camino::{Utf8Path, Utf8PathBuf};
use irrigation_domain::fingerprint::{canonical_json, sha256_hex};
use irrigation_domain::{AuditSink, AuditWriteError};
use irrigation_types::{AuditRef, LedgerBody, LedgerEntry};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub fn entry_hash(prev_hash: &str, body: &JsonValue) -> String {
    let mut bytes = prev_hash.as_bytes().to_vec();
    bytes.extend_from_slice(canonical_json(body).as_bytes());
    sha256_hex(&bytes)
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("ledger chain broken at seq {seq}: {reason}")]
pub struct ChainViolation {
    pub seq: u64,
    pub reason: String,
}

/// Verify raw ledger lines (parsed only as JSON) and return the entry count.
pub fn verify_lines(lines: &[JsonValue]) -> Result<usize, ChainViolation> {
    let mut prev = GENESIS_HASH.to_string();
    for (i, line) in lines.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        let violation = |reason: String| ChainViolation {
            seq: expected_seq,
            reason,
        };
        let seq = line.get("seq").and_then(JsonValue::as_u64);
        if seq != Some(expected_seq) {
            return Err(violation(format!("expected seq {expected_seq}, found {seq:?}")));
        }
        let prev_hash = line.get("prev_hash").and_then(JsonValue::as_str);
        if prev_hash != Some(prev.as_str()) {
            return Err(violation("prev_hash does not match previous entry".to_string()));
        }
        let body = line
            .get("body")
            .ok_or_else(|| violation("missing body".to_string()))?;
        let recomputed = entry_hash(&prev, body);
        if line.get("hash").and_then(JsonValue::as_str) != Some(recomputed.as_str()) {
            return Err(violation("hash does not match entry contents".to_string()));
        }
        prev = recomputed;
    }
    Ok(lines.len())
}

/// Verify typed entries.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<usize, ChainViolation> {
    let lines: Vec<JsonValue> = entries
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or(JsonValue::Null))
        .collect();
    verify_lines(&lines)
}

#[derive(Debug)]
struct Head {
    next_seq: u64,
    last_hash: String,
}

impl Head {
    fn genesis() -> Self {
        Self {
            next_seq: 1,
            last_hash: GENESIS_HASH.to_string(),
        }
    }

    /// Chain `body` onto the head without committing it.
    fn link(&self, body: LedgerBody) -> Result<LedgerEntry, LedgerError> {
        let value = serde_json::to_value(&body)?;
        Ok(LedgerEntry {
            seq: self.next_seq,
            prev_hash: self.last_hash.clone(),
            hash: entry_hash(&self.last_hash, &value),
            body,
        })
    }

    fn advance(&mut self, entry: &LedgerEntry) {
        self.next_seq = entry.seq + 1;
        self.last_hash = entry.hash.clone();
    }
}

/// JSONL-backed ledger; appends are synced to disk before they are acknowledged.
#[derive(Debug)]
pub struct FileAuditLedger {
    inner: Mutex<(JsonlFile, Head)>,
}

impl FileAuditLedger {
    /// Open (or create) the ledger at `path`, resuming the chain from its last entry.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let existing: Vec<LedgerEntry> = read_all(path)?;
        let mut head = Head::genesis();
        if let Some(last) = existing.last() {
            head.advance(last);
        }
        let file = JsonlFile::open(path)?;
        Ok(Self {
            inner: Mutex::new((file, head)),
        })
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.inner.lock().0.path().to_path_buf()
    }

    pub fn append_entry(&self, body: LedgerBody) -> Result<LedgerEntry, LedgerError> {
        let mut guard = self.inner.lock();
        let (file, head) = &mut *guard;
        let entry = head.link(body)?;
        file.append(&entry)?;
        head.advance(&entry);
        debug!(
            seq = entry.seq,
            signal_id = %entry.body.signal_id(),
            "ledger entry appended"
        );
        Ok(entry)
    }

    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        read_all(&self.path())
    }
}

/// Verify the chain stored at `path` and return its entry count.
pub fn verify_file(path: impl AsRef<Utf8Path>) -> Result<usize, LedgerError> {
    let lines: Vec<JsonValue> = read_all(path.as_ref())?;
    Ok(verify_lines(&lines)?)
}

impl AuditSink for FileAuditLedger {
    fn append(&self, body: LedgerBody) -> Result<AuditRef, AuditWriteError> {
        self.append_entry(body)
            .map(|e| AuditRef {
                seq: e.seq,
                hash: e.hash,
            })
            .map_err(|e| AuditWriteError(e.to_string()))
    }
}

/// In-process ledger with the same chaining rules.
#[derive(Debug)]
pub struct MemoryAuditLedger {
    inner: Mutex<(Vec<LedgerEntry>, Head)>,
}

impl Default for MemoryAuditLedger {
    fn default() -> Self {
        Self {
            inner: Mutex::new((Vec::new(), Head::genesis())),
        }
    }
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().0.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLedger {
    fn append(&self, body: LedgerBody) -> Result<AuditRef, AuditWriteError> {
        let mut guard = self.inner.lock();
        let (entries, head) = &mut *guard;
        let entry = head
            .link(body)
            .map_err(|e| AuditWriteError(e.to_string()))?;
        head.advance(&entry);
        let audit = AuditRef {
            seq: entry.seq,
            hash: entry.hash.clone(),
        };
        entries.push(entry);
        Ok(audit)
    }
}
