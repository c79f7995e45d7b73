//! The signal lifecycle on top of [`Shared`]: gate evaluation, dispatch, delivery callbacks,
//! expiry and settlement.

use crate::breaker::BreakerState;
use crate::events::SignalEvent;
use crate::lane::Job;
use crate::metrics::Counter;
use crate::orchestrator::SubmitError;
use crate::shared::Shared;
use crate::status::{ConsumerDelivery, DeliveryState, SignalState};
use irrigation_domain::{ChainOutcome, GateContext, evaluate, rejection_record};
use irrigation_ledger::{DeadLetter, LedgerError};
use irrigation_types::{
    AuditRef, ConsumerId, ConsumerOutcome, DispatchOutcomeRecord, HealthState, LedgerBody,
    ReasonCode, Signal, SignalId,
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// What to do after one pass through the gate chain.
pub(crate) enum Step {
    Dispatch {
        consumers: Vec<ConsumerId>,
        spilled: Vec<ConsumerId>,
        audit: Option<AuditRef>,
    },
    /// Retryable gate 4 condition; run the chain again after the wait.
    Defer(Duration),
    /// Terminal, or already handled elsewhere.
    Done,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl Shared {
    pub(crate) fn transition(&self, id: &SignalId, state: SignalState, detail: Option<String>) {
        let entered = self
            .board
            .with(id, |t| t.transition(state, detail.clone(), OffsetDateTime::now_utc()))
            .unwrap_or(false);
        if entered {
            debug!(signal_id = %id, state = state.as_str(), "signal state changed");
            self.emit(SignalEvent::StateChanged {
                signal_id: id.clone(),
                state,
                detail,
            });
        }
    }

    fn escalate_audit_failure(&self, id: &SignalId, detail: String) {
        error!(signal_id = %id, detail = %detail, "audit ledger refused a write");
        self.emit(SignalEvent::AuditFailure {
            signal_id: id.clone(),
            detail,
        });
    }

    /// Append a dead letter and attach its sequence number to the signal's status.
    ///
    /// A refused write is escalated on the event channel before the error is returned.
    pub(crate) fn dead_letter(&self, letter: DeadLetter) -> Result<u64, LedgerError> {
        let id = letter.signal.id().clone();
        let consumer_id = letter.consumer_id.clone();
        let code = letter.code;
        let entry = match self.dead_letters.append(letter) {
            Ok(entry) => entry,
            Err(e) => {
                error!(signal_id = %id, code = %code, error = %e, "dead-letter write failed");
                self.emit(SignalEvent::DeadLetterFailure {
                    signal_id: id,
                    code,
                    consumer_id,
                    detail: e.to_string(),
                });
                return Err(e);
            }
        };
        self.board.with(&id, |t| t.status.dead_letters.push(entry.seq));
        self.metrics.incr(Counter::DeadLettered);
        info!(
            signal_id = %id,
            seq = entry.seq,
            code = %entry.code,
            "signal dead-lettered"
        );
        self.emit(SignalEvent::DeadLettered {
            signal_id: id,
            seq: entry.seq,
            code: entry.code,
            consumer_id,
        });
        Ok(entry.seq)
    }

    /// One pass through gates 1 to 4. `attempt` counts earlier gate 4 deferrals.
    pub(crate) fn run_chain(&self, signal: &Arc<Signal>, attempt: u32) -> Result<Step, SubmitError> {
        let id = signal.id();
        let expired = self
            .board
            .with(id, |t| {
                t.gate_retry_pending = false;
                t.expired
            })
            .unwrap_or(true);
        if expired {
            self.try_settle(id);
            return Ok(Step::Done);
        }
        let now = OffsetDateTime::now_utc();
        if signal.is_expired_at(now) {
            self.expire_signal(signal, "expires_at passed before validation".to_string())?;
            self.try_settle(id);
            return Ok(Step::Done);
        }

        let detail = (attempt > 0).then(|| format!("gate retry {attempt}"));
        self.transition(id, SignalState::Validating, detail);
        let report = evaluate(signal.as_ref(), self, now);
        self.metrics.record_verdicts(&report.verdicts);
        self.board.with(id, |t| t.status.gates = report.verdicts.clone());
        for v in &report.verdicts {
            debug!(
                gate = %v.gate,
                passed = v.passed,
                bypassed = v.bypassed,
                latency_us = v.latency_us,
                "gate verdict"
            );
        }

        match report.outcome {
            ChainOutcome::Authorized { consumers, spilled } => Ok(Step::Dispatch {
                consumers,
                spilled,
                audit: report.audit,
            }),
            ChainOutcome::Deferred {
                code,
                retry_after,
                detail,
            } if attempt < self.config.channel.max_channel_retries => {
                let wait =
                    retry_after.unwrap_or_else(|| self.config.channel.retry_backoff(attempt + 1));
                self.metrics.incr(Counter::GateRetries);
                warn!(
                    code = %code,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "gate 4 deferred signal; retrying"
                );
                self.board.with(id, |t| t.gate_retry_pending = true);
                self.transition(id, SignalState::Retry, Some(detail));
                Ok(Step::Defer(wait))
            }
            ChainOutcome::Deferred { code, detail, .. } => {
                let record = rejection_record(
                    signal,
                    &report.verdicts,
                    code,
                    report.validation_latency_us,
                    now,
                );
                let (audit, audit_error) = match self.write_audit(&record) {
                    Ok(audit) => (Some(audit), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                let detail = format!("{detail} (after {attempt} retries)");
                self.reject(signal, code, detail, audit, audit_error)
            }
            ChainOutcome::Rejected { code, detail, .. } => {
                self.reject(signal, code, detail, report.audit, report.audit_error)
            }
        }
    }

    fn reject(
        &self,
        signal: &Arc<Signal>,
        code: ReasonCode,
        detail: String,
        audit: Option<AuditRef>,
        audit_error: Option<String>,
    ) -> Result<Step, SubmitError> {
        let id = signal.id();
        if code.escalates() {
            self.escalate_audit_failure(id, detail.clone());
        }
        if let Some(e) = audit_error {
            self.escalate_audit_failure(id, e);
        }
        self.metrics.incr(Counter::Rejected);
        if code == ReasonCode::DuplicateSignal {
            self.metrics.incr(Counter::Deduplicated);
        }
        info!(signal_id = %id, code = %code, detail = %detail, "signal rejected");
        self.board.with(id, |t| {
            t.status.code = Some(code);
            if audit.is_some() {
                t.status.audit = audit;
            }
        });
        self.transition(id, SignalState::Rejected, Some(detail.clone()));
        self.dead_letter(DeadLetter::new(signal.as_ref().clone(), code, detail))?;
        self.transition(id, SignalState::DeadLetter, None);
        self.try_settle(id);
        Ok(Step::Done)
    }

    /// Hand an authorized signal to each target consumer's lane.
    pub(crate) async fn dispatch(
        &self,
        signal: &Arc<Signal>,
        consumers: Vec<ConsumerId>,
        spilled: Vec<ConsumerId>,
        audit: Option<AuditRef>,
    ) {
        let id = signal.id();
        let targets: Vec<String> = consumers.iter().map(ToString::to_string).collect();
        self.board.with(id, |t| {
            t.status.audit = audit;
            t.status.spilled = spilled;
            t.status.deliveries = consumers
                .iter()
                .map(|c| ConsumerDelivery {
                    consumer_id: c.clone(),
                    state: DeliveryState::Queued,
                    attempts: 0,
                    last_error: None,
                })
                .collect();
            t.dispatched_at = Some(tokio::time::Instant::now());
        });
        self.transition(
            id,
            SignalState::Routed,
            Some(format!("routed to [{}]", targets.join(", "))),
        );
        self.metrics.incr(Counter::Dispatched);
        self.transition(id, SignalState::Dispatched, None);

        for consumer_id in consumers {
            let queued = match self.lane(&consumer_id) {
                Some(lane) => lane
                    .enqueue(Job {
                        signal: signal.clone(),
                    })
                    .await
                    .map_err(|_| "consumer lane closed"),
                None => Err("consumer lane not running"),
            };
            if let Err(reason) = queued {
                self.fail_delivery(signal, &consumer_id, 0, reason.to_string());
            }
        }
        self.try_settle(id);
    }

    /// Re-run the chain after gate 4 deferrals until the signal is dispatched or terminal.
    pub(crate) async fn retry_gates(self: Arc<Self>, signal: Arc<Signal>, mut wait: Duration) {
        let mut attempt = 1;
        loop {
            tokio::time::sleep(wait).await;
            match self.run_chain(&signal, attempt) {
                Ok(Step::Dispatch {
                    consumers,
                    spilled,
                    audit,
                }) => {
                    self.dispatch(&signal, consumers, spilled, audit).await;
                    break;
                }
                Ok(Step::Defer(next)) => {
                    wait = next;
                    attempt += 1;
                }
                Ok(Step::Done) => break,
                Err(e) => {
                    error!(signal_id = %signal.id(), error = %e, "gate retry failed");
                    break;
                }
            }
        }
    }

    pub(crate) fn delivery_started(&self, id: &SignalId, consumer_id: &ConsumerId, attempt: u32) {
        let redelivery = self
            .board
            .with(id, |t| {
                if let Some(d) = t.delivery_mut(consumer_id) {
                    d.state = DeliveryState::InFlight;
                    d.attempts = attempt;
                }
                t.status.state == SignalState::Retry
            })
            .unwrap_or(false);
        if redelivery {
            self.transition(
                id,
                SignalState::Dispatched,
                Some(format!("attempt {attempt} to {consumer_id}")),
            );
        }
    }

    pub(crate) fn delivery_acked(&self, id: &SignalId, consumer_id: &ConsumerId, attempts: u32) {
        self.board.with(id, |t| {
            if let Some(d) = t.delivery_mut(consumer_id) {
                d.state = DeliveryState::Acknowledged;
                d.attempts = attempts;
            }
        });
        self.metrics.incr(Counter::Delivered);
        debug!(signal_id = %id, consumer_id = %consumer_id, attempts, "consumer acknowledged");
        self.emit(SignalEvent::Delivered {
            signal_id: id.clone(),
            consumer_id: consumer_id.clone(),
            attempts,
        });
        self.settle_deliveries(id);
    }

    pub(crate) fn delivery_retrying(
        &self,
        id: &SignalId,
        consumer_id: &ConsumerId,
        attempt: u32,
        error: &str,
        wait: Duration,
    ) {
        self.board.with(id, |t| {
            if let Some(d) = t.delivery_mut(consumer_id) {
                d.state = DeliveryState::Retrying;
                d.last_error = Some(error.to_string());
            }
        });
        self.metrics.incr(Counter::DeliveryRetries);
        warn!(
            signal_id = %id,
            consumer_id = %consumer_id,
            attempt,
            wait_ms = wait.as_millis() as u64,
            error,
            "delivery failed; retrying"
        );
        self.emit(SignalEvent::DeliveryFailed {
            signal_id: id.clone(),
            consumer_id: consumer_id.clone(),
            attempt,
            error: error.to_string(),
        });
        self.transition(
            id,
            SignalState::Failed,
            Some(format!("{consumer_id}: {error}")),
        );
        self.transition(
            id,
            SignalState::Retry,
            Some(format!("{consumer_id} retry in {}ms", wait.as_millis())),
        );
    }

    pub(crate) fn delivery_exhausted(
        &self,
        signal: &Signal,
        consumer_id: &ConsumerId,
        attempts: u32,
        error: String,
    ) {
        self.emit(SignalEvent::DeliveryFailed {
            signal_id: signal.id().clone(),
            consumer_id: consumer_id.clone(),
            attempt: attempts,
            error: error.clone(),
        });
        self.fail_delivery(signal, consumer_id, attempts, error);
    }

    /// Dead-letter one consumer's copy and fold the result into the signal state.
    fn fail_delivery(&self, signal: &Signal, consumer_id: &ConsumerId, attempts: u32, error: String) {
        let id = signal.id();
        self.board.with(id, |t| {
            if let Some(d) = t.delivery_mut(consumer_id) {
                d.state = DeliveryState::DeadLettered;
                d.attempts = attempts;
                d.last_error = Some(error.clone());
            }
        });
        let detail = format!("delivery to {consumer_id} failed after {attempts} attempts: {error}");
        let letter = DeadLetter::new(signal.clone(), ReasonCode::ConsumerFailure, detail)
            .for_consumer(consumer_id.clone());
        // Escalated by `dead_letter`; the delivery is finished either way.
        let _ = self.dead_letter(letter);
        self.settle_deliveries(id);
    }

    fn settle_deliveries(&self, id: &SignalId) {
        let policy = self.config.dispatch.ack_policy;
        let entered = self
            .board
            .with(id, |t| t.settle_deliveries(policy, OffsetDateTime::now_utc()))
            .unwrap_or_default();
        for (state, detail) in entered {
            debug!(signal_id = %id, state = state.as_str(), "signal state changed");
            self.emit(SignalEvent::StateChanged {
                signal_id: id.clone(),
                state,
                detail,
            });
        }
        self.try_settle(id);
    }

    pub(crate) fn circuit_changed(&self, consumer_id: &ConsumerId, state: BreakerState) {
        warn!(consumer_id = %consumer_id, state = state.as_str(), "circuit breaker changed state");
        self.emit(SignalEvent::CircuitChanged {
            consumer_id: consumer_id.clone(),
            state,
        });
        let health = match state {
            BreakerState::Open => HealthState::Degraded,
            BreakerState::Closed => HealthState::Healthy,
            BreakerState::HalfOpen => return,
        };
        if let Err(e) = self.registry.update_health(consumer_id, health) {
            debug!(consumer_id = %consumer_id, error = %e, "health update skipped");
        }
    }

    /// Dead-letter a signal as EXPIRED. Returns `false` if it was already expired or terminal.
    pub(crate) fn expire_signal(&self, signal: &Signal, detail: String) -> Result<bool, LedgerError> {
        let id = signal.id();
        let first = self
            .board
            .with(id, |t| {
                if t.expired || t.status.state.is_terminal() {
                    return false;
                }
                t.expired = true;
                t.status.code = Some(ReasonCode::Expired);
                true
            })
            .unwrap_or(false);
        if !first {
            return Ok(false);
        }
        self.metrics.incr(Counter::Expired);
        self.dead_letter(DeadLetter::new(signal.clone(), ReasonCode::Expired, detail.clone()))?;
        self.transition(id, SignalState::DeadLetter, Some(detail));
        Ok(true)
    }

    /// Checked by a lane before every delivery attempt. Returns `true` if the copy must not be
    /// delivered.
    pub(crate) fn expired_before_delivery(&self, signal: &Signal, consumer_id: &ConsumerId) -> bool {
        let id = signal.id();
        let marked = self.board.with(id, |t| t.expired).unwrap_or(true);
        if !marked && !signal.is_expired_at(OffsetDateTime::now_utc()) {
            return false;
        }
        self.board.with(id, |t| {
            if let Some(d) = t.delivery_mut(consumer_id) {
                d.state = DeliveryState::Expired;
            }
        });
        let detail = format!("expires_at passed before delivery to {consumer_id}");
        // Escalated by `dead_letter`.
        let _ = self.expire_signal(signal, detail);
        self.try_settle(id);
        true
    }

    /// Record the dispatch outcome once nothing is pending, then mark the signal settled.
    pub(crate) fn try_settle(&self, id: &SignalId) {
        let settled = self
            .board
            .with(id, |t| {
                if !t.ready_to_settle() {
                    return None;
                }
                t.settling = true;
                let outcome = match (&t.status.audit, t.status.deliveries.is_empty()) {
                    (Some(audit), false) => Some(DispatchOutcomeRecord {
                        signal_id: id.clone(),
                        authorization_seq: audit.seq,
                        acknowledged: t.status.state == SignalState::Acknowledged,
                        deliveries: t
                            .status
                            .deliveries
                            .iter()
                            .map(|d| ConsumerOutcome {
                                consumer_id: d.consumer_id.clone(),
                                acknowledged: d.state == DeliveryState::Acknowledged,
                                attempts: d.attempts,
                                last_error: d.last_error.clone(),
                            })
                            .collect(),
                        dispatch_latency_us: t.dispatched_at.map_or(0, |at| micros(at.elapsed())),
                        recorded_at: OffsetDateTime::now_utc(),
                    }),
                    _ => None,
                };
                Some((t.status.state, outcome))
            })
            .flatten();
        let Some((state, outcome)) = settled else {
            return;
        };
        if let Some(record) = outcome
            && let Err(e) = self.ledger.append(LedgerBody::Outcome(record))
        {
            self.escalate_audit_failure(id, e.to_string());
        }
        self.board.mark_settled(id);
        debug!(signal_id = %id, state = state.as_str(), "signal settled");
        self.emit(SignalEvent::Settled {
            signal_id: id.clone(),
            state,
        });
    }
}
