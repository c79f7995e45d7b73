//! Integration tests for the on-disk audit ledger and dead-letter store.
//!
//! These tests verify that:
//! - Reopening a ledger resumes the chain where it stopped
//! - Editing any line on disk is caught by verification
//! - Dead-letter purges are tombstones, so the file only ever grows

use camino::Utf8PathBuf;
use irrigation_domain::AuditSink;
use irrigation_ledger::{
    AUDIT_FILE, DEAD_LETTER_FILE, DeadLetter, DeadLetterRecord, DeadLetterStore,
    FileAuditLedger, FileDeadLetters, GENESIS_HASH, LedgerError, PurgeSelection, verify_file,
};
use irrigation_types::{
    AuditRecord, ChannelDecision, ConsumerId, LedgerBody, ReasonCode, Signal, SignalId,
    SignalType,
};
use time::OffsetDateTime;

fn data_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 temp path");
    (tmp, dir)
}

fn authorization(id: &str) -> LedgerBody {
    LedgerBody::Authorization(AuditRecord {
        signal_id: SignalId::new(id),
        signal_type: SignalType::ScoringPrimary,
        source_phase: 4,
        target_scopes: vec!["Q042".to_string()],
        gates: vec![],
        decision: ChannelDecision::Authorized {
            consumers: vec![ConsumerId::for_phase(4).unwrap()],
            spilled: vec![],
        },
        validation_latency_us: 7,
        recorded_at: OffsetDateTime::UNIX_EPOCH,
    })
}

fn signal(scope: &str) -> Signal {
    Signal::builder(SignalType::ScoringPrimary, 4)
        .scope(scope)
        .build()
        .unwrap()
}

#[test]
fn reopened_ledger_continues_the_chain() {
    let (_tmp, dir) = data_dir();
    let path = dir.join("nested").join(AUDIT_FILE);

    {
        let ledger = FileAuditLedger::open(&path).unwrap();
        ledger.append(authorization("sig-a")).unwrap();
        ledger.append(authorization("sig-b")).unwrap();
    }

    let ledger = FileAuditLedger::open(&path).unwrap();
    let third = ledger.append(authorization("sig-c")).unwrap();
    assert_eq!(third.seq, 3);

    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    assert_eq!(entries[2].prev_hash, entries[1].hash);
    assert_eq!(verify_file(&path).unwrap(), 3);
}

#[test]
fn editing_a_line_on_disk_is_detected() {
    let (_tmp, dir) = data_dir();
    let path = dir.join(AUDIT_FILE);
    let ledger = FileAuditLedger::open(&path).unwrap();
    for id in ["sig-a", "sig-b", "sig-c"] {
        ledger.append(authorization(id)).unwrap();
    }
    drop(ledger);

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replacen("sig-b", "sig-z", 1)).unwrap();

    match verify_file(&path) {
        Err(LedgerError::Chain(v)) => assert_eq!(v.seq, 2),
        other => panic!("expected chain violation, got {other:?}"),
    }
}

#[test]
fn missing_ledger_verifies_as_empty() {
    let (_tmp, dir) = data_dir();
    assert_eq!(verify_file(dir.join(AUDIT_FILE)).unwrap(), 0);
}

#[test]
fn garbage_line_is_reported_as_corrupt() {
    let (_tmp, dir) = data_dir();
    let path = dir.join(AUDIT_FILE);
    std::fs::write(&path, "{not json}\n").unwrap();
    assert!(matches!(
        verify_file(&path),
        Err(LedgerError::Corrupt { line: 1, .. })
    ));
}

#[test]
fn dead_letter_purge_appends_a_tombstone() {
    let (_tmp, dir) = data_dir();
    let path = dir.join(DEAD_LETTER_FILE);
    let keep = signal("Q001");
    let drop_me = signal("Q002");

    {
        let store = FileDeadLetters::open(&path).unwrap();
        store
            .append(DeadLetter::new(drop_me.clone(), ReasonCode::ScopeNotFound, "x"))
            .unwrap();
        store
            .append(
                DeadLetter::new(keep.clone(), ReasonCode::ConsumerFailure, "nack")
                    .for_consumer(ConsumerId::for_phase(4).unwrap()),
            )
            .unwrap();
    }

    let store = FileDeadLetters::open(&path).unwrap();
    let purged = store
        .purge(&PurgeSelection::Signal(drop_me.id().clone()))
        .unwrap();
    assert_eq!(purged, 1);

    let live = store.list().unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].signal.id(), keep.id());
    assert_eq!(live[0].seq, 2);

    let records = store.records().unwrap();
    assert_eq!(records.len(), 3);
    assert!(matches!(records[2], DeadLetterRecord::Tombstone(_)));

    // Sequence numbers keep increasing after a purge and a reopen.
    let next = store
        .append(DeadLetter::new(signal("Q003"), ReasonCode::Expired, "ttl"))
        .unwrap();
    assert_eq!(next.seq, 3);
}

#[test]
fn purge_all_then_nothing_left_to_purge() {
    let (_tmp, dir) = data_dir();
    let store = FileDeadLetters::open(dir.join(DEAD_LETTER_FILE)).unwrap();
    for scope in ["Q001", "Q002"] {
        store
            .append(DeadLetter::new(signal(scope), ReasonCode::LowValue, "thin"))
            .unwrap();
    }
    assert_eq!(store.purge(&PurgeSelection::All).unwrap(), 2);
    assert_eq!(store.purge(&PurgeSelection::All).unwrap(), 0);
    assert!(store.list().unwrap().is_empty());
}
