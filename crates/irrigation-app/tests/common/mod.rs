//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use irrigation_app::{Consumer, Delivery, Orchestrator, SignalStatus};
use irrigation_domain::policy::EffectiveConfig;
use irrigation_domain::{AuditSink, AuditWriteError};
use irrigation_ledger::{
    DeadLetter, DeadLetterStore, LedgerError, MemoryAuditLedger, MemoryDeadLetters, PurgeSelection,
};
use irrigation_registry::{ConsumerRegistration, ConsumerTuning, RetryPolicy};
use irrigation_types::{AuditRef, DeadLetterEntry, LedgerBody, ScopeSelector, Signal, SignalType};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub const SETTLE: Duration = Duration::from_secs(3600);

/// Orchestrator plus handles on its in-memory stores.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<MemoryAuditLedger>,
    pub dead_letters: Arc<MemoryDeadLetters>,
}

impl Harness {
    pub fn new(config: EffectiveConfig) -> Self {
        let ledger = Arc::new(MemoryAuditLedger::new());
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let orchestrator = Orchestrator::new(config, ledger.clone(), dead_letters.clone());
        Self {
            orchestrator,
            ledger,
            dead_letters,
        }
    }

    pub fn register(&self, registration: ConsumerRegistration, handler: Arc<dyn Consumer>) {
        self.orchestrator.register(registration, handler).unwrap();
    }

    pub async fn run(&self, signal: Signal) -> SignalStatus {
        let receipt = self.orchestrator.submit(signal).await.unwrap();
        self.orchestrator
            .wait_settled(&receipt.signal_id, SETTLE)
            .await
            .unwrap()
    }

    pub fn ledger_bodies(&self) -> Vec<LedgerBody> {
        self.ledger.entries().into_iter().map(|e| e.body).collect()
    }
}

pub fn config() -> EffectiveConfig {
    let mut cfg = EffectiveConfig::default();
    cfg.channel.rate_limit_per_sec = 0.0;
    cfg
}

pub fn fast_tuning(max_retries: u32) -> ConsumerTuning {
    ConsumerTuning {
        priority: 5,
        max_concurrent: 4,
        timeout: Duration::from_secs(1),
        queue_capacity: 64,
        retry: RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            multiplier: 2.0,
        },
        self_heartbeat: false,
    }
}

pub fn consumer(phase: u8, types: &[SignalType]) -> ConsumerRegistration {
    ConsumerRegistration::for_phase(phase)
        .unwrap()
        .accepting(types.iter().copied())
        .serving([ScopeSelector::parse("Q*").unwrap()])
        .with_tuning(fast_tuning(2))
}

/// SCORING_PRIMARY from phase 4 for [Q042, PA02, D3]. `n` varies the payload.
pub fn scoring(n: u32) -> Signal {
    Signal::builder(SignalType::ScoringPrimary, 4)
        .scopes(["Q042", "PA02", "D3"])
        .payload(json!({"score": 0.82, "evidence": [format!("p.{n} table 2")]}))
        .build()
        .unwrap()
}

/// Replies from a script, then acknowledges everything.
#[derive(Default)]
pub struct Scripted {
    replies: Mutex<VecDeque<Delivery>>,
    calls: AtomicU32,
}

impl Scripted {
    pub fn acking() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replies(replies: impl IntoIterator<Item = Delivery>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn nacking(times: usize) -> Arc<Self> {
        Self::replies((0..times).map(|i| Delivery::Nack(format!("boom {}", i + 1))))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Consumer for Scripted {
    async fn deliver(&self, _signal: &Signal) -> Delivery {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies.lock().pop_front().unwrap_or(Delivery::Ack)
    }
}

/// Never answers.
pub struct Hanging;

#[async_trait]
impl Consumer for Hanging {
    async fn deliver(&self, _signal: &Signal) -> Delivery {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Delivery::Ack
    }
}

/// Holds its first delivery until released, then acknowledges everything.
#[derive(Default)]
pub struct Gated {
    pub release: Notify,
    calls: AtomicU32,
}

impl Gated {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Consumer for Gated {
    async fn deliver(&self, _signal: &Signal) -> Delivery {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
        }
        Delivery::Ack
    }
}

/// Refuses every write.
#[derive(Default)]
pub struct BrokenLedger {
    pub attempts: AtomicU32,
}

impl AuditSink for BrokenLedger {
    fn append(&self, _body: LedgerBody) -> Result<AuditRef, AuditWriteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditWriteError("disk full".to_string()))
    }
}

/// Dead-letter sink whose disk is full.
#[derive(Default)]
pub struct BrokenDeadLetters {
    pub attempts: AtomicU32,
}

impl DeadLetterStore for BrokenDeadLetters {
    fn append(&self, _letter: DeadLetter) -> Result<DeadLetterEntry, LedgerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::Io {
            path: "dead_letters.jsonl".into(),
            source: std::io::Error::other("disk full"),
        })
    }

    fn list(&self) -> Result<Vec<DeadLetterEntry>, LedgerError> {
        Ok(Vec::new())
    }

    fn purge(&self, _selection: &PurgeSelection) -> Result<usize, LedgerError> {
        Ok(0)
    }
}
