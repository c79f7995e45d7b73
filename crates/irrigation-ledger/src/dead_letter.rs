//! Dead-letter sink.

use crate::error::LedgerError;
use crate::jsonl::{JsonlFile, read_all};
use camino::{Utf8Path, Utf8PathBuf};
use irrigation_types::{ConsumerId, DeadLetterEntry, ReasonCode, Signal, SignalId, Stage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use tracing::info;

/// A failure to be dead-lettered. The store assigns sequence number and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter {
    pub signal: Signal,
    pub stage: Stage,
    pub code: ReasonCode,
    pub consumer_id: Option<ConsumerId>,
    pub detail: String,
}

impl DeadLetter {
    /// Dead letter attributed to the stage that owns `code`.
    pub fn new(signal: Signal, code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            signal,
            stage: code.stage(),
            code,
            consumer_id: None,
            detail: detail.into(),
        }
    }

    pub fn for_consumer(mut self, consumer_id: ConsumerId) -> Self {
        self.consumer_id = Some(consumer_id);
        self
    }

    fn into_entry(self, seq: u64, at: OffsetDateTime) -> DeadLetterEntry {
        DeadLetterEntry {
            seq,
            signal: self.signal,
            stage: self.stage,
            code: self.code,
            consumer_id: self.consumer_id,
            detail: self.detail,
            dead_lettered_at: at,
        }
    }
}

/// Operator purge marker. Purged entries stay in the file but are no longer listed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub seqs: Vec<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub purged_at: OffsetDateTime,
}

/// One line of the dead-letter file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum DeadLetterRecord {
    Entry(DeadLetterEntry),
    Tombstone(Tombstone),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurgeSelection {
    All,
    Signal(SignalId),
    Seqs(Vec<u64>),
}

impl PurgeSelection {
    fn matches(&self, entry: &DeadLetterEntry) -> bool {
        match self {
            PurgeSelection::All => true,
            PurgeSelection::Signal(id) => entry.signal.id() == id,
            PurgeSelection::Seqs(seqs) => seqs.contains(&entry.seq),
        }
    }
}

/// Entries not covered by a tombstone, in sequence order.
fn live_entries(records: &[DeadLetterRecord]) -> Vec<DeadLetterEntry> {
    let purged: BTreeSet<u64> = records
        .iter()
        .filter_map(|r| match r {
            DeadLetterRecord::Tombstone(t) => Some(t.seqs.iter().copied()),
            DeadLetterRecord::Entry(_) => None,
        })
        .flatten()
        .collect();
    records
        .iter()
        .filter_map(|r| match r {
            DeadLetterRecord::Entry(e) if !purged.contains(&e.seq) => Some(e.clone()),
            _ => None,
        })
        .collect()
}

fn max_seq(records: &[DeadLetterRecord]) -> u64 {
    records
        .iter()
        .filter_map(|r| match r {
            DeadLetterRecord::Entry(e) => Some(e.seq),
            DeadLetterRecord::Tombstone(_) => None,
        })
        .max()
        .unwrap_or(0)
}

fn tombstone_for(live: &[DeadLetterEntry], selection: &PurgeSelection) -> Option<Tombstone> {
    let seqs: Vec<u64> = live
        .iter()
        .filter(|e| selection.matches(e))
        .map(|e| e.seq)
        .collect();
    if seqs.is_empty() {
        return None;
    }
    Some(Tombstone {
        seqs,
        purged_at: OffsetDateTime::now_utc(),
    })
}

/// Append-only store of terminal failures.
pub trait DeadLetterStore: Send + Sync {
    fn append(&self, letter: DeadLetter) -> Result<DeadLetterEntry, LedgerError>;
    /// Entries not yet purged.
    fn list(&self) -> Result<Vec<DeadLetterEntry>, LedgerError>;
    /// Tombstone the selected entries and return how many were purged.
    fn purge(&self, selection: &PurgeSelection) -> Result<usize, LedgerError>;
}

#[derive(Debug)]
pub struct FileDeadLetters {
    path: Utf8PathBuf,
    inner: Mutex<(JsonlFile, u64)>,
}

impl FileDeadLetters {
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let records: Vec<DeadLetterRecord> = read_all(path)?;
        let file = JsonlFile::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new((file, max_seq(&records))),
        })
    }

    pub fn records(&self) -> Result<Vec<DeadLetterRecord>, LedgerError> {
        read_all(&self.path)
    }
}

impl DeadLetterStore for FileDeadLetters {
    fn append(&self, letter: DeadLetter) -> Result<DeadLetterEntry, LedgerError> {
        let mut guard = self.inner.lock();
        let (file, last_seq) = &mut *guard;
        let entry = letter.into_entry(*last_seq + 1, OffsetDateTime::now_utc());
        file.append(&DeadLetterRecord::Entry(entry.clone()))?;
        *last_seq = entry.seq;
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<DeadLetterEntry>, LedgerError> {
        Ok(live_entries(&self.records()?))
    }

    fn purge(&self, selection: &PurgeSelection) -> Result<usize, LedgerError> {
        let mut guard = self.inner.lock();
        let live = live_entries(&read_all(&self.path)?);
        let Some(tombstone) = tombstone_for(&live, selection) else {
            return Ok(0);
        };
        let purged = tombstone.seqs.len();
        guard.0.append(&DeadLetterRecord::Tombstone(tombstone))?;
        info!(purged, path = %self.path, "dead letters purged");
        Ok(purged)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().clone()
    }
}

impl DeadLetterStore for MemoryDeadLetters {
    fn append(&self, letter: DeadLetter) -> Result<DeadLetterEntry, LedgerError> {
        let mut records = self.records.lock();
        let entry = letter.into_entry(max_seq(&records) + 1, OffsetDateTime::now_utc());
        records.push(DeadLetterRecord::Entry(entry.clone()));
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<DeadLetterEntry>, LedgerError> {
        Ok(live_entries(&self.records.lock()))
    }

    fn purge(&self, selection: &PurgeSelection) -> Result<usize, LedgerError> {
        let mut records = self.records.lock();
        let live = live_entries(&records);
        let Some(tombstone) = tombstone_for(&live, selection) else {
            return Ok(0);
        };
        let purged = tombstone.seqs.len();
        records.push(DeadLetterRecord::Tombstone(tombstone));
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrigation_types::SignalType;

    fn signal() -> Signal {
        Signal::builder(SignalType::ScoringPrimary, 4)
            .scope("Q999")
            .build()
            .unwrap()
    }

    #[test]
    fn letters_take_their_code_stage() {
        let l = DeadLetter::new(signal(), ReasonCode::ScopeNotFound, "no such question");
        assert_eq!(l.stage, Stage::ScopeAlignment);
        let l = DeadLetter::new(signal(), ReasonCode::ConsumerFailure, "nack")
            .for_consumer(ConsumerId::for_phase(4).unwrap());
        assert_eq!(l.stage, Stage::Dispatch);
        assert!(l.consumer_id.is_some());
    }

    #[test]
    fn memory_store_assigns_sequence_and_purges_by_tombstone() {
        let store = MemoryDeadLetters::new();
        let a = store
            .append(DeadLetter::new(signal(), ReasonCode::ScopeNotFound, "a"))
            .unwrap();
        let b = store
            .append(DeadLetter::new(signal(), ReasonCode::LowValue, "b"))
            .unwrap();
        assert_eq!((a.seq, b.seq), (1, 2));

        assert_eq!(store.purge(&PurgeSelection::Seqs(vec![1])).unwrap(), 1);
        let live = store.list().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].seq, 2);

        // Nothing is removed from the record stream.
        assert_eq!(store.records().len(), 3);
        assert_eq!(store.purge(&PurgeSelection::Seqs(vec![1])).unwrap(), 0);
    }

    #[test]
    fn purge_by_signal() {
        let store = MemoryDeadLetters::new();
        let s = signal();
        store
            .append(DeadLetter::new(s.clone(), ReasonCode::ConsumerFailure, "x"))
            .unwrap();
        store
            .append(DeadLetter::new(signal(), ReasonCode::ScopeNotFound, "y"))
            .unwrap();
        assert_eq!(
            store
                .purge(&PurgeSelection::Signal(s.id().clone()))
                .unwrap(),
            1
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn records_are_tagged() {
        let t = DeadLetterRecord::Tombstone(Tombstone {
            seqs: vec![3],
            purged_at: OffsetDateTime::UNIX_EPOCH,
        });
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["record"], "tombstone");
        assert_eq!(v["seqs"], serde_json::json!([3]));
    }
}
