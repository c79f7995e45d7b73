use crate::audit::AuditWriteError;
use crate::engine::GateContext;
use crate::model::{ChannelLoad, ConsumerProfile, FactKey};
use crate::policy::EffectiveConfig;
use crate::scopes::ScopeRegistry;
use crate::state::{DedupWindow, ScopeFacts, TokenBucket};
use irrigation_types::{
    AuditRecord, AuditRef, ConsumerId, HealthState, LedgerBody, Scope, ScopeSelector, SignalType,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

pub fn profile(phase: u8, types: &[SignalType], scopes: &[&str]) -> ConsumerProfile {
    ConsumerProfile {
        id: ConsumerId::for_phase(phase).unwrap(),
        priority: 5,
        signal_types: types.iter().copied().collect(),
        capabilities: types.iter().map(|t| t.required_capability()).collect(),
        scopes: scopes
            .iter()
            .map(|s| ScopeSelector::parse(s).unwrap())
            .collect(),
        health: HealthState::Healthy,
    }
}

/// Single-threaded [`GateContext`] that records which seams the engine touched.
pub struct FakeContext {
    cfg: EffectiveConfig,
    registry: ScopeRegistry,
    consumers: Vec<ConsumerProfile>,
    depths: RefCell<BTreeMap<ConsumerId, usize>>,
    facts: RefCell<ScopeFacts>,
    dedup: RefCell<DedupWindow>,
    bucket: RefCell<TokenBucket>,
    ledger: RefCell<Vec<LedgerBody>>,
    fail_audit: Cell<bool>,
    calls: RefCell<Vec<&'static str>>,
}

impl FakeContext {
    pub fn with_consumers(consumers: Vec<ConsumerProfile>) -> Self {
        let cfg = EffectiveConfig::default();
        let facts_per_scope = cfg.value_add.facts_per_scope;
        let now = Instant::now();
        Self {
            registry: ScopeRegistry::new(cfg.scopes.clone()),
            dedup: RefCell::new(DedupWindow::new(cfg.channel.dedup_window)),
            bucket: RefCell::new(TokenBucket::new(
                cfg.channel.rate_limit_per_sec,
                cfg.channel.rate_limit_burst,
                now,
            )),
            cfg,
            consumers,
            depths: RefCell::new(BTreeMap::new()),
            facts: RefCell::new(ScopeFacts::new(facts_per_scope)),
            ledger: RefCell::new(Vec::new()),
            fail_audit: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn set_depth(&self, phase: u8, depth: usize) {
        self.depths
            .borrow_mut()
            .insert(ConsumerId::for_phase(phase).unwrap(), depth);
    }

    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.set(fail);
    }

    pub fn exhaust_rate_limit(&self) {
        *self.bucket.borrow_mut() = TokenBucket::new(1.0, 1, Instant::now());
        let _ = self.bucket.borrow_mut().try_acquire(Instant::now());
    }

    /// One token left and no meaningful refill.
    pub fn single_rate_token(&self) {
        *self.bucket.borrow_mut() = TokenBucket::new(0.001, 1, Instant::now());
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn ledger(&self) -> Vec<LedgerBody> {
        self.ledger.borrow().clone()
    }

    pub fn facts_for(&self, scope: &Scope) -> usize {
        self.facts.borrow().facts_for(scope)
    }

    fn call(&self, name: &'static str) {
        self.calls.borrow_mut().push(name);
    }
}

impl GateContext for FakeContext {
    fn policy(&self) -> &EffectiveConfig {
        &self.cfg
    }

    fn scopes(&self) -> &ScopeRegistry {
        &self.registry
    }

    fn novel_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) -> usize {
        self.call("novel_facts");
        self.facts.borrow().novel(scopes, facts, fingerprint)
    }

    fn record_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) {
        self.call("record_facts");
        self.facts.borrow_mut().record(scopes, facts, fingerprint);
    }

    fn candidates(&self, signal_type: SignalType) -> Vec<ConsumerProfile> {
        self.call("candidates");
        self.consumers
            .iter()
            .filter(|c| c.signal_types.contains(&signal_type))
            .cloned()
            .collect()
    }

    fn channel_loads(&self, consumers: &[ConsumerId]) -> Vec<ChannelLoad> {
        self.call("channel_loads");
        let depths = self.depths.borrow();
        consumers
            .iter()
            .map(|id| ChannelLoad {
                consumer_id: id.clone(),
                depth: depths.get(id).copied().unwrap_or(0),
                capacity: 100,
            })
            .collect()
    }

    fn reserve_dedup(&self, fingerprint: &str) -> bool {
        self.call("reserve_dedup");
        self.dedup.borrow_mut().reserve(fingerprint, Instant::now())
    }

    fn release_dedup(&self, fingerprint: &str) {
        self.call("release_dedup");
        self.dedup.borrow_mut().release(fingerprint);
    }

    fn acquire_rate_token(&self) -> Result<(), Duration> {
        self.call("acquire_rate_token");
        self.bucket.borrow_mut().try_acquire(Instant::now())
    }

    fn refund_rate_token(&self) {
        self.call("refund_rate_token");
        self.bucket.borrow_mut().refund();
    }

    fn write_audit(&self, record: &AuditRecord) -> Result<AuditRef, AuditWriteError> {
        self.call("write_audit");
        if self.fail_audit.get() {
            return Err(AuditWriteError("disk full".to_string()));
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.push(LedgerBody::Authorization(record.clone()));
        Ok(AuditRef {
            seq: ledger.len() as u64,
            hash: format!("hash-{}", ledger.len()),
        })
    }
}

pub fn all_types() -> BTreeSet<SignalType> {
    SignalType::ALL.into_iter().collect()
}
