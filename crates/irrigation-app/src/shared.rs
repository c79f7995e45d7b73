//! State owned by one orchestrator and the gate context built on it.

use crate::events::SignalEvent;
use crate::lane::Lane;
use crate::metrics::Metrics;
use crate::status::StatusBoard;
use irrigation_domain::model::{ChannelLoad, ConsumerProfile, FactKey};
use irrigation_domain::policy::EffectiveConfig;
use irrigation_domain::scopes::ScopeRegistry;
use irrigation_domain::state::{DedupWindow, ScopeFacts, TokenBucket};
use irrigation_domain::{AuditSink, AuditWriteError, GateContext};
use irrigation_ledger::DeadLetterStore;
use irrigation_registry::ConsumerRegistry;
use irrigation_types::{AuditRecord, AuditRef, ConsumerId, LedgerBody, Scope, SignalType};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::error;

pub(crate) struct Shared {
    pub(crate) config: EffectiveConfig,
    scopes: ScopeRegistry,
    pub(crate) registry: ConsumerRegistry,
    lanes: RwLock<BTreeMap<ConsumerId, Arc<Lane>>>,
    facts: Mutex<ScopeFacts>,
    dedup: Mutex<DedupWindow>,
    rate: Mutex<TokenBucket>,
    pub(crate) ledger: Arc<dyn AuditSink>,
    pub(crate) dead_letters: Arc<dyn DeadLetterStore>,
    pub(crate) board: StatusBoard,
    pub(crate) metrics: Metrics,
    events: broadcast::Sender<SignalEvent>,
}

impl Shared {
    pub(crate) fn new(
        config: EffectiveConfig,
        ledger: Arc<dyn AuditSink>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.dispatch.event_buffer.max(1));
        Self {
            scopes: ScopeRegistry::new(config.scopes.clone()),
            registry: ConsumerRegistry::new(config.registry.clone()),
            lanes: RwLock::new(BTreeMap::new()),
            facts: Mutex::new(ScopeFacts::new(config.value_add.facts_per_scope)),
            dedup: Mutex::new(DedupWindow::new(config.channel.dedup_window)),
            rate: Mutex::new(TokenBucket::new(
                config.channel.rate_limit_per_sec,
                config.channel.rate_limit_burst,
                Instant::now(),
            )),
            ledger,
            dead_letters,
            board: StatusBoard::new(config.dispatch.status_retention),
            metrics: Metrics::default(),
            events,
            config,
        }
    }

    pub(crate) fn emit(&self, event: SignalEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.events.subscribe()
    }

    pub(crate) fn lane(&self, id: &ConsumerId) -> Option<Arc<Lane>> {
        self.lanes.read().get(id).cloned()
    }

    pub(crate) fn install_lane(&self, lane: Lane) {
        self.lanes
            .write()
            .insert(lane.consumer_id().clone(), Arc::new(lane));
    }

    pub(crate) fn remove_lane(&self, id: &ConsumerId) -> Option<Arc<Lane>> {
        self.lanes.write().remove(id)
    }
}

impl GateContext for Shared {
    fn policy(&self) -> &EffectiveConfig {
        &self.config
    }

    fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    fn novel_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) -> usize {
        self.facts.lock().novel(scopes, facts, fingerprint)
    }

    fn record_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) {
        self.facts.lock().record(scopes, facts, fingerprint);
    }

    fn candidates(&self, signal_type: SignalType) -> Vec<ConsumerProfile> {
        self.registry.find_by_signal_type(signal_type)
    }

    fn channel_loads(&self, consumers: &[ConsumerId]) -> Vec<ChannelLoad> {
        let lanes = self.lanes.read();
        consumers
            .iter()
            .filter_map(|id| lanes.get(id).map(|lane| lane.load()))
            .collect()
    }

    fn reserve_dedup(&self, fingerprint: &str) -> bool {
        self.dedup.lock().reserve(fingerprint, Instant::now())
    }

    fn release_dedup(&self, fingerprint: &str) {
        self.dedup.lock().release(fingerprint);
    }

    fn acquire_rate_token(&self) -> Result<(), Duration> {
        self.rate.lock().try_acquire(Instant::now())
    }

    fn refund_rate_token(&self) {
        self.rate.lock().refund();
    }

    fn write_audit(&self, record: &AuditRecord) -> Result<AuditRef, AuditWriteError> {
        self.ledger
            .append(LedgerBody::Authorization(record.clone()))
            .inspect_err(|e| {
                error!(signal_id = %record.signal_id, error = %e, "audit write failed");
            })
    }
}
