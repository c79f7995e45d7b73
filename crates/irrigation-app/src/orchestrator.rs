//! The signal distribution orchestrator.

use crate::breaker::BreakerState;
use crate::consumer::Consumer;
use crate::events::SignalEvent;
use crate::lane::Lane;
use crate::metrics::{Counter, MetricsSnapshot};
use crate::pipeline::Step;
use crate::shared::Shared;
use crate::status::{SignalState, SignalStatus, Tracked};
use irrigation_domain::AuditSink;
use irrigation_domain::policy::EffectiveConfig;
use irrigation_ledger::{
    DeadLetterStore, LedgerError, MemoryAuditLedger, MemoryDeadLetters, PurgeSelection,
};
use irrigation_registry::{ConsumerRegistration, ConsumerRegistry, HealthReport, RegistryError};
use irrigation_types::{ConsumerId, DeadLetterEntry, HealthState, ReasonCode, Signal, SignalId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Instrument, info, info_span};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub signal_id: SignalId,
    /// State when `submit` returned.
    pub state: SignalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("signal {0} was already submitted")]
    AlreadyTracked(SignalId),
    #[error("dead-letter sink unavailable: {0}")]
    DeadLetter(#[from] LedgerError),
}

#[derive(Debug, Error)]
pub enum ExpireError {
    #[error("signal {0} is not tracked")]
    NotFound(SignalId),
    #[error("signal {signal_id} is already {}", .state.as_str())]
    AlreadyTerminal {
        signal_id: SignalId,
        state: SignalState,
    },
    #[error("dead-letter sink unavailable: {0}")]
    DeadLetter(#[from] LedgerError),
}

/// Entry point for producers, consumers and operators.
///
/// Cheap to clone; clones share one pipeline. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        config: EffectiveConfig,
        ledger: Arc<dyn AuditSink>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        info!(profile = %config.profile, "orchestrator started");
        Self {
            shared: Arc::new(Shared::new(config, ledger, dead_letters)),
        }
    }

    /// Orchestrator backed by in-memory ledger and dead-letter stores.
    pub fn in_memory(config: EffectiveConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryAuditLedger::new()),
            Arc::new(MemoryDeadLetters::new()),
        )
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &ConsumerRegistry {
        &self.shared.registry
    }

    /// Register a consumer and start its delivery lane.
    ///
    /// The consumer starts healthy. Unless its tuning sets `self_heartbeat`, it must report
    /// through [`Self::heartbeat`] within the registry's `heartbeat_max_age` or Gate 3 stops
    /// routing to it.
    pub fn register(
        &self,
        registration: ConsumerRegistration,
        handler: Arc<dyn Consumer>,
    ) -> Result<ConsumerId, RegistryError> {
        let id = self.shared.registry.register(registration)?;
        let registration = self
            .shared
            .registry
            .get(&id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        self.shared.registry.update_health(&id, HealthState::Healthy)?;
        let lane = Lane::spawn(
            Arc::downgrade(&self.shared),
            registration,
            handler,
            &self.shared.config.dispatch,
            self.shared.config.registry.heartbeat_max_age / 2,
        );
        self.shared.install_lane(lane);
        Ok(id)
    }

    /// Remove a consumer. Copies already queued on its lane are still delivered.
    pub fn deregister(&self, id: &ConsumerId) -> Result<(), RegistryError> {
        self.shared.registry.deregister(id)?;
        self.shared.remove_lane(id);
        Ok(())
    }

    pub fn health_check(&self, id: &ConsumerId) -> Result<HealthReport, RegistryError> {
        self.shared.registry.health_check(id)
    }

    /// Circuit breaker state of a registered consumer's lane.
    pub fn circuit_state(&self, id: &ConsumerId) -> Option<BreakerState> {
        self.shared.lane(id).map(|lane| lane.breaker_state())
    }

    /// Push a health report for an out-of-process consumer.
    pub fn heartbeat(&self, id: &ConsumerId, state: HealthState) -> Result<HealthState, RegistryError> {
        self.shared.registry.update_health(id, state)
    }

    /// Validate and route one signal.
    ///
    /// Returns once the signal is dispatched, terminally rejected or deferred for a gate 4
    /// retry. Delivery continues on background tasks.
    pub async fn submit(&self, signal: Signal) -> Result<SubmitReceipt, SubmitError> {
        let span = info_span!("signal", signal_id = %signal.id(), signal_type = %signal.signal_type());
        self.submit_inner(Arc::new(signal)).instrument(span).await
    }

    async fn submit_inner(&self, signal: Arc<Signal>) -> Result<SubmitReceipt, SubmitError> {
        let shared = &self.shared;
        let id = signal.id().clone();
        shared.metrics.incr(Counter::Submitted);
        if !shared
            .board
            .insert(Tracked::new(signal.clone(), OffsetDateTime::now_utc()))
        {
            return Err(SubmitError::AlreadyTracked(id));
        }
        shared.emit(SignalEvent::StateChanged {
            signal_id: id.clone(),
            state: SignalState::Created,
            detail: None,
        });

        match shared.run_chain(&signal, 0)? {
            Step::Dispatch {
                consumers,
                spilled,
                audit,
            } => shared.dispatch(&signal, consumers, spilled, audit).await,
            Step::Defer(wait) => {
                let span = tracing::Span::current();
                tokio::spawn(shared.clone().retry_gates(signal.clone(), wait).instrument(span));
            }
            Step::Done => {}
        }
        Ok(self.receipt(&id))
    }

    fn receipt(&self, id: &SignalId) -> SubmitReceipt {
        let (state, code) = self
            .shared
            .board
            .with(id, |t| (t.status.state, t.status.code))
            .unwrap_or((SignalState::Created, None));
        SubmitReceipt {
            signal_id: id.clone(),
            state,
            code,
        }
    }

    pub fn get_status(&self, id: &SignalId) -> Option<SignalStatus> {
        self.shared.board.snapshot(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.shared.subscribe()
    }

    /// Operator expiry: dead-letter the signal as EXPIRED. Pending deliveries stop before
    /// their next attempt.
    pub fn expire(&self, id: &SignalId) -> Result<SignalStatus, ExpireError> {
        let shared = &self.shared;
        let (signal, state) = shared
            .board
            .with(id, |t| (t.signal.clone(), t.status.state))
            .ok_or_else(|| ExpireError::NotFound(id.clone()))?;
        if state.is_terminal() {
            return Err(ExpireError::AlreadyTerminal {
                signal_id: id.clone(),
                state,
            });
        }
        shared.expire_signal(&signal, "expired by operator".to_string())?;
        shared.try_settle(id);
        shared
            .board
            .snapshot(id)
            .ok_or_else(|| ExpireError::NotFound(id.clone()))
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, LedgerError> {
        self.shared.dead_letters.list()
    }

    pub fn purge_dead_letters(&self, selection: &PurgeSelection) -> Result<usize, LedgerError> {
        self.shared.dead_letters.purge(selection)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Wait until nothing further will happen to the signal, or `timeout` passes.
    pub async fn wait_settled(&self, id: &SignalId, timeout: Duration) -> Option<SignalStatus> {
        let mut events = self.shared.subscribe();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            match self.shared.board.snapshot(id) {
                Some(status) if status.settled => return Some(status),
                None => return None,
                Some(_) => {}
            }
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(SignalEvent::Settled { signal_id, .. }) if &signal_id == id => {}
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return self.shared.board.snapshot(id),
                    }
                }
                () = &mut deadline => return self.shared.board.snapshot(id),
            }
        }
    }
}
