use crate::audit::AuditWriteError;
use crate::fingerprint::signal_fingerprint;
use crate::gates::irrigation_channel::{self, ChannelAdmission};
use crate::gates::value_add::{self, PayloadShape, ValueDecision};
use crate::gates::{GateFailure, capability, scope_alignment};
use crate::model::{ChannelLoad, ConsumerProfile, FactKey};
use crate::policy::EffectiveConfig;
use crate::scopes::ScopeRegistry;
use irrigation_types::{
    AuditRecord, AuditRef, ChannelDecision, ConsumerId, Gate, GateVerdict, ReasonCode, Scope,
    Signal, SignalType,
};
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Everything the gate chain reads or mutates outside the signal itself.
///
/// Implementations own their synchronization; every method takes `&self`.
pub trait GateContext {
    fn policy(&self) -> &EffectiveConfig;
    fn scopes(&self) -> &ScopeRegistry;

    /// Count of `facts` not yet recorded for any of `scopes` by another fingerprint.
    fn novel_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) -> usize;
    fn record_facts(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str);

    /// Registered consumers that declare `signal_type`, in any health state.
    fn candidates(&self, signal_type: SignalType) -> Vec<ConsumerProfile>;
    fn channel_loads(&self, consumers: &[ConsumerId]) -> Vec<ChannelLoad>;

    fn reserve_dedup(&self, fingerprint: &str) -> bool;
    fn release_dedup(&self, fingerprint: &str);
    /// Take a global rate token, or return the wait until the next one.
    fn acquire_rate_token(&self) -> Result<(), Duration>;
    /// Return a token taken for a signal the channel then blocked.
    fn refund_rate_token(&self);

    fn write_audit(&self, record: &AuditRecord) -> Result<AuditRef, AuditWriteError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChainOutcome {
    /// Audited and cleared for dispatch.
    Authorized {
        consumers: Vec<ConsumerId>,
        spilled: Vec<ConsumerId>,
    },
    /// Terminal failure at `gate`.
    Rejected {
        gate: Gate,
        code: ReasonCode,
        detail: String,
    },
    /// Retryable gate 4 condition. `retry_after` is set when the gate knows the wait.
    Deferred {
        code: ReasonCode,
        retry_after: Option<Duration>,
        detail: String,
    },
}

#[derive(Clone, Debug)]
pub struct ChainReport {
    /// One verdict per gate that was invoked, in order.
    pub verdicts: Vec<GateVerdict>,
    pub outcome: ChainOutcome,
    pub validation_latency_us: u64,
    pub fingerprint: String,
    /// Ledger entry written for this evaluation, if any.
    pub audit: Option<AuditRef>,
    /// Set when a gate 4 rejection could not be recorded in the ledger.
    pub audit_error: Option<String>,
}

impl ChainReport {
    pub fn last_gate(&self) -> Option<Gate> {
        self.verdicts.last().map(|v| v.gate)
    }
}

/// Run gates 1 to 4 in order. A gate failure stops evaluation; later gates are not invoked.
pub fn evaluate<C>(signal: &Signal, ctx: &C, now: OffsetDateTime) -> ChainReport
where
    C: GateContext + ?Sized,
{
    let started = Instant::now();
    let mut run = Run {
        started,
        verdicts: Vec::with_capacity(Gate::ORDER.len()),
        fingerprint: signal_fingerprint(signal),
    };

    // Gate 1
    let t = Instant::now();
    let scopes = match scope_alignment::evaluate(signal, ctx.scopes()) {
        Ok(scopes) => {
            run.pass(Gate::ScopeAlignment, t, None, false);
            scopes
        }
        Err(f) => return run.reject(Gate::ScopeAlignment, t, f),
    };

    // Gate 2
    let t = Instant::now();
    let value_policy = &ctx.policy().value_add;
    let shape = PayloadShape::of(signal.payload());
    let novel = ctx.novel_facts(&scopes, &shape.facts, &run.fingerprint);
    let assessment = value_add::assess(signal, &shape, novel, value_policy, now);
    match value_add::decide(signal, assessment.score, value_policy) {
        ValueDecision::Pass => run.pass(Gate::ValueAdd, t, Some(assessment.score), false),
        ValueDecision::Bypass => run.pass(Gate::ValueAdd, t, Some(assessment.score), true),
        ValueDecision::Fail => {
            let failure = GateFailure::new(
                ReasonCode::LowValue,
                format!(
                    "value-add score {:.4} is below threshold {:.2} (uniqueness {:.2}, density {:.2})",
                    assessment.score, value_policy.threshold, assessment.uniqueness, assessment.density
                ),
            );
            let mut report = run.reject(Gate::ValueAdd, t, failure);
            if let Some(v) = report.verdicts.last_mut() {
                v.score = Some(assessment.score);
            }
            return report;
        }
    }

    // Gate 3
    let t = Instant::now();
    let candidates = ctx.candidates(signal.signal_type());
    let eligible = match capability::evaluate(signal, &scopes, &candidates) {
        Ok(eligible) => {
            run.pass(Gate::Capability, t, None, false);
            eligible
        }
        Err(f) => return run.reject(Gate::Capability, t, f),
    };

    // Gate 4
    let t = Instant::now();
    let channel_policy = &ctx.policy().channel;
    if !ctx.reserve_dedup(&run.fingerprint) {
        let failure = GateFailure::new(
            ReasonCode::DuplicateSignal,
            format!(
                "identical signal already accepted within the {}s dedup window",
                channel_policy.dedup_window.as_secs()
            ),
        );
        let mut report = run.reject(Gate::IrrigationChannel, t, failure);
        record_rejection(signal, ctx, &mut report, now);
        return report;
    }

    if let Err(wait) = ctx.acquire_rate_token() {
        ctx.release_dedup(&run.fingerprint);
        let failure = GateFailure::new(
            ReasonCode::RateLimited,
            format!("global rate limit reached; next token in {}ms", wait.as_millis()),
        );
        return run.defer(t, failure, Some(wait));
    }

    let loads = ctx.channel_loads(&eligible);
    let (consumers, spilled) =
        match irrigation_channel::admit(signal.priority(), &loads, channel_policy) {
            ChannelAdmission::Open { consumers, spilled } => (consumers, spilled),
            ChannelAdmission::Blocked { blocked } => {
                ctx.refund_rate_token();
                ctx.release_dedup(&run.fingerprint);
                let names: Vec<String> = blocked.iter().map(ToString::to_string).collect();
                let failure = GateFailure::new(
                    ReasonCode::ChannelBlocked,
                    format!("consumer queue at high-water mark: [{}]", names.join(", ")),
                );
                return run.defer(t, failure, None);
            }
        };

    run.pass(Gate::IrrigationChannel, t, None, false);
    let record = AuditRecord {
        signal_id: signal.id().clone(),
        signal_type: signal.signal_type(),
        source_phase: signal.source_phase(),
        target_scopes: signal.target_scopes().to_vec(),
        gates: run.verdicts.clone(),
        decision: ChannelDecision::Authorized {
            consumers: consumers.clone(),
            spilled: spilled.clone(),
        },
        validation_latency_us: micros_since(started),
        recorded_at: now,
    };

    match ctx.write_audit(&record) {
        Ok(audit) => {
            ctx.record_facts(&scopes, &shape.facts, &run.fingerprint);
            let mut report = run.finish(ChainOutcome::Authorized { consumers, spilled });
            report.audit = Some(audit);
            report
        }
        Err(e) => {
            ctx.release_dedup(&run.fingerprint);
            run.verdicts.pop();
            run.reject(
                Gate::IrrigationChannel,
                t,
                GateFailure::new(ReasonCode::AuditFailure, e.to_string()),
            )
        }
    }
}

/// Audit record for a signal that gate 4 finally refused.
pub fn rejection_record(
    signal: &Signal,
    verdicts: &[GateVerdict],
    code: ReasonCode,
    validation_latency_us: u64,
    now: OffsetDateTime,
) -> AuditRecord {
    AuditRecord {
        signal_id: signal.id().clone(),
        signal_type: signal.signal_type(),
        source_phase: signal.source_phase(),
        target_scopes: signal.target_scopes().to_vec(),
        gates: verdicts.to_vec(),
        decision: ChannelDecision::Rejected { code },
        validation_latency_us,
        recorded_at: now,
    }
}

fn record_rejection<C>(signal: &Signal, ctx: &C, report: &mut ChainReport, now: OffsetDateTime)
where
    C: GateContext + ?Sized,
{
    let ChainOutcome::Rejected { code, .. } = &report.outcome else {
        return;
    };
    let record = rejection_record(
        signal,
        &report.verdicts,
        *code,
        report.validation_latency_us,
        now,
    );
    match ctx.write_audit(&record) {
        Ok(audit) => report.audit = Some(audit),
        Err(e) => report.audit_error = Some(e.to_string()),
    }
}

struct Run {
    started: Instant,
    verdicts: Vec<GateVerdict>,
    fingerprint: String,
}

impl Run {
    fn pass(&mut self, gate: Gate, t: Instant, score: Option<f64>, bypassed: bool) {
        self.verdicts.push(GateVerdict {
            gate,
            passed: true,
            bypassed,
            code: None,
            score,
            detail: None,
            latency_us: micros_since(t),
        });
    }

    fn fail(&mut self, gate: Gate, t: Instant, failure: &GateFailure) {
        self.verdicts.push(GateVerdict {
            gate,
            passed: false,
            bypassed: false,
            code: Some(failure.code),
            score: None,
            detail: Some(failure.detail.clone()),
            latency_us: micros_since(t),
        });
    }

    fn reject(mut self, gate: Gate, t: Instant, failure: GateFailure) -> ChainReport {
        self.fail(gate, t, &failure);
        self.finish(ChainOutcome::Rejected {
            gate,
            code: failure.code,
            detail: failure.detail,
        })
    }

    fn defer(mut self, t: Instant, failure: GateFailure, retry_after: Option<Duration>) -> ChainReport {
        self.fail(Gate::IrrigationChannel, t, &failure);
        self.finish(ChainOutcome::Deferred {
            code: failure.code,
            retry_after,
            detail: failure.detail,
        })
    }

    fn finish(self, outcome: ChainOutcome) -> ChainReport {
        ChainReport {
            verdicts: self.verdicts,
            outcome,
            validation_latency_us: micros_since(self.started),
            fingerprint: self.fingerprint,
            audit: None,
            audit_error: None,
        }
    }
}

fn micros_since(t: Instant) -> u64 {
    u64::try_from(t.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeContext, profile};
    use irrigation_types::{HealthState, LedgerBody, Priority};
    use serde_json::json;

    fn scoring() -> Signal {
        Signal::builder(SignalType::ScoringPrimary, 4)
            .scopes(["Q042", "PA02", "D3"])
            .payload(json!({"score": 0.82, "evidence": ["p.4 table 2"]}))
            .build()
            .unwrap()
    }

    fn gates(report: &ChainReport) -> Vec<Gate> {
        report.verdicts.iter().map(|v| v.gate).collect()
    }

    #[test]
    fn valid_signal_passes_every_gate_and_is_audited() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());

        assert_eq!(gates(&report), Gate::ORDER.to_vec());
        assert!(report.verdicts.iter().all(|v| v.passed));
        assert_eq!(
            report.outcome,
            ChainOutcome::Authorized {
                consumers: vec![ConsumerId::for_phase(4).unwrap()],
                spilled: vec![]
            }
        );
        assert!(report.audit.is_some());
        let ledger = ctx.ledger();
        assert_eq!(ledger.len(), 1);
        let LedgerBody::Authorization(record) = &ledger[0] else {
            panic!("expected authorization");
        };
        assert_eq!(record.signal_id, *s.id());
        assert_eq!(record.gates.len(), 4);
    }

    #[test]
    fn gate_one_failure_never_reaches_gate_two() {
        let ctx = FakeContext::with_consumers(vec![]);
        let s = Signal::builder(SignalType::ScoringPrimary, 4)
            .scope("Q999")
            .build()
            .unwrap();
        let report = evaluate(&s, &ctx, s.created_at());

        assert_eq!(gates(&report), vec![Gate::ScopeAlignment]);
        assert!(matches!(
            report.outcome,
            ChainOutcome::Rejected {
                gate: Gate::ScopeAlignment,
                code: ReasonCode::ScopeNotFound,
                ..
            }
        ));
        assert!(ctx.calls().is_empty());
    }

    #[test]
    fn low_value_stops_before_capability_lookup() {
        let ctx = FakeContext::with_consumers(vec![]);
        let s = Signal::builder(SignalType::ScoringPrimary, 4)
            .scope("Q042")
            .build()
            .unwrap();
        let report = evaluate(&s, &ctx, s.created_at());

        assert_eq!(gates(&report), vec![Gate::ScopeAlignment, Gate::ValueAdd]);
        let v = &report.verdicts[1];
        assert_eq!(v.code, Some(ReasonCode::LowValue));
        assert!(v.score.is_some());
        assert_eq!(ctx.calls(), vec!["novel_facts"]);
    }

    #[test]
    fn enrichment_bypass_then_no_capable_consumer() {
        let ctx = FakeContext::with_consumers(vec![]);
        let s = Signal::builder(SignalType::EnrichmentMetadata, 2)
            .scope("Q042")
            .build()
            .unwrap();
        let report = evaluate(&s, &ctx, s.created_at());

        assert!(report.verdicts[1].passed);
        assert!(report.verdicts[1].bypassed);
        assert!(matches!(
            report.outcome,
            ChainOutcome::Rejected {
                gate: Gate::Capability,
                code: ReasonCode::NoCapableConsumer,
                ..
            }
        ));
        assert!(!ctx.calls().contains(&"reserve_dedup"));
    }

    #[test]
    fn duplicate_is_rejected_and_audited() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        let first = scoring();
        let second = Signal::builder(SignalType::ScoringPrimary, 4)
            .scopes(["Q042", "PA02", "D3"])
            .payload(first.payload().clone())
            .build()
            .unwrap();

        let r1 = evaluate(&first, &ctx, first.created_at());
        assert!(matches!(r1.outcome, ChainOutcome::Authorized { .. }));
        let r2 = evaluate(&second, &ctx, second.created_at());
        assert!(matches!(
            r2.outcome,
            ChainOutcome::Rejected {
                code: ReasonCode::DuplicateSignal,
                ..
            }
        ));
        assert!(r2.audit.is_some());
        assert_eq!(ctx.ledger().len(), 2);
    }

    #[test]
    fn audit_failure_blocks_dispatch_and_releases_dedup() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        ctx.fail_audit(true);
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());

        assert!(matches!(
            report.outcome,
            ChainOutcome::Rejected {
                gate: Gate::IrrigationChannel,
                code: ReasonCode::AuditFailure,
                ..
            }
        ));
        assert!(report.audit.is_none());
        assert_eq!(report.verdicts.len(), 4);
        assert!(!report.verdicts[3].passed);
        assert_eq!(ctx.calls().last(), Some(&"release_dedup"));
        assert!(!ctx.calls().contains(&"record_facts"));

        ctx.fail_audit(false);
        let retry = evaluate(&s, &ctx, s.created_at());
        assert!(matches!(retry.outcome, ChainOutcome::Authorized { .. }));
    }

    #[test]
    fn full_queue_defers_and_releases_dedup() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        ctx.set_depth(4, 100);
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());

        assert!(matches!(
            report.outcome,
            ChainOutcome::Deferred {
                code: ReasonCode::ChannelBlocked,
                retry_after: None,
                ..
            }
        ));
        assert!(ctx.ledger().is_empty());
        assert_eq!(ctx.calls().last(), Some(&"release_dedup"));
    }

    #[test]
    fn blocked_channel_refunds_its_rate_token() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        ctx.single_rate_token();
        ctx.set_depth(4, 100);
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());
        assert!(matches!(
            report.outcome,
            ChainOutcome::Deferred {
                code: ReasonCode::ChannelBlocked,
                ..
            }
        ));
        assert_eq!(
            ctx.calls().iter().rev().take(2).copied().collect::<Vec<_>>(),
            ["release_dedup", "refund_rate_token"]
        );

        ctx.set_depth(4, 0);
        let report = evaluate(&s, &ctx, s.created_at());
        assert!(
            matches!(report.outcome, ChainOutcome::Authorized { .. }),
            "{:?}",
            report.outcome
        );
    }

    #[test]
    fn high_priority_spill_is_recorded() {
        let ctx = FakeContext::with_consumers(vec![
            profile(4, &[SignalType::ScoringPrimary], &["Q*"]),
            profile(5, &[SignalType::ScoringPrimary], &["Q*"]),
        ]);
        ctx.set_depth(4, 100);
        let s = Signal::builder(SignalType::ScoringPrimary, 4)
            .scope("Q042")
            .payload(json!({"score": 0.9}))
            .priority(Priority::High)
            .build()
            .unwrap();
        let report = evaluate(&s, &ctx, s.created_at());
        assert_eq!(
            report.outcome,
            ChainOutcome::Authorized {
                consumers: vec![ConsumerId::for_phase(5).unwrap()],
                spilled: vec![ConsumerId::for_phase(4).unwrap()]
            }
        );
    }

    #[test]
    fn rate_limit_defers_with_wait() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        ctx.exhaust_rate_limit();
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());
        let ChainOutcome::Deferred {
            code, retry_after, ..
        } = report.outcome
        else {
            panic!("expected deferral");
        };
        assert_eq!(code, ReasonCode::RateLimited);
        assert!(retry_after.is_some());
    }

    #[test]
    fn facts_are_committed_only_after_authorization() {
        let ctx = FakeContext::with_consumers(vec![profile(
            4,
            &[SignalType::ScoringPrimary],
            &["Q*"],
        )]);
        let s = scoring();
        let q = Scope::parse("Q042").unwrap();
        assert_eq!(ctx.facts_for(&q), 0);
        let _ = evaluate(&s, &ctx, s.created_at());
        assert_eq!(ctx.facts_for(&q), 2);
    }

    #[test]
    fn degraded_consumer_still_routes() {
        let mut c = profile(4, &[SignalType::ScoringPrimary], &["Q*"]);
        c.health = HealthState::Degraded;
        let ctx = FakeContext::with_consumers(vec![c]);
        let s = scoring();
        let report = evaluate(&s, &ctx, s.created_at());
        assert!(matches!(report.outcome, ChainOutcome::Authorized { .. }));
    }
}
