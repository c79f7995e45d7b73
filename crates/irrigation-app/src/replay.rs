//! The `replay` use case: push recorded signals through an in-process orchestrator whose
//! configured consumers all acknowledge.

use crate::consumer::{AckingConsumer, Consumer};
use crate::factory::{Handlers, build_orchestrator, load_config};
use crate::metrics::MetricsSnapshot;
use crate::status::SignalStatus;
use anyhow::Context;
use irrigation_settings::Overrides;
use irrigation_types::{Priority, Signal, SignalId, SignalType};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One line of a replay file. Timestamps are assigned at submission.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaySignal {
    #[serde(default)]
    pub signal_id: Option<SignalId>,
    pub signal_type: SignalType,
    pub source_phase: u8,
    pub target_scopes: Vec<String>,
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub bypass_value_gate: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl ReplaySignal {
    pub fn into_signal(self) -> anyhow::Result<Signal> {
        let mut builder = Signal::builder(self.signal_type, self.source_phase)
            .scopes(self.target_scopes)
            .payload(self.payload)
            .priority(self.priority)
            .bypass_value_gate(self.bypass_value_gate);
        if let Some(id) = self.signal_id {
            builder = builder.id(id);
        }
        if let Some(ms) = self.ttl_ms {
            let ms = i64::try_from(ms).context("ttl_ms out of range")?;
            builder = builder.ttl(time::Duration::milliseconds(ms));
        }
        for (k, v) in self.tags {
            builder = builder.tag(k, v);
        }
        Ok(builder.build()?)
    }
}

/// Parse a replay file. Blank lines and `#` comments are skipped.
pub fn parse_replay_signals(text: &str) -> anyhow::Result<Vec<Signal>> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let spec: ReplaySignal =
            serde_json::from_str(line).with_context(|| format!("signals line {}", i + 1))?;
        out.push(spec.into_signal().with_context(|| format!("signals line {}", i + 1))?);
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct ReplayInput<'a> {
    pub config_text: &'a str,
    pub overrides: Overrides,
    pub signals_text: &'a str,
    /// How long to wait for each signal to settle.
    pub settle_timeout: Duration,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayOutput {
    pub statuses: Vec<SignalStatus>,
    pub metrics: MetricsSnapshot,
}

pub async fn run_replay(input: ReplayInput<'_>) -> anyhow::Result<ReplayOutput> {
    let resolved = load_config(input.config_text, input.overrides)?;
    let handlers: Handlers = resolved
        .consumers
        .iter()
        .map(|c| (c.consumer_id.clone(), Arc::new(AckingConsumer) as Arc<dyn Consumer>))
        .collect();
    let orchestrator = build_orchestrator(resolved, handlers).context("build orchestrator")?;
    let signals = parse_replay_signals(input.signals_text)?;

    let mut ids = Vec::with_capacity(signals.len());
    for signal in signals {
        let receipt = orchestrator.submit(signal).await.context("submit signal")?;
        ids.push(receipt.signal_id);
    }

    let mut statuses = Vec::with_capacity(ids.len());
    for id in &ids {
        match orchestrator.wait_settled(id, input.settle_timeout).await {
            Some(status) => {
                if !status.settled {
                    warn!(signal_id = %id, state = status.state.as_str(), "signal did not settle");
                }
                statuses.push(status);
            }
            None => warn!(signal_id = %id, "signal status missing"),
        }
    }
    Ok(ReplayOutput {
        statuses,
        metrics: orchestrator.metrics(),
    })
}

pub fn format_replay(output: &ReplayOutput) -> String {
    let mut out = String::new();
    for s in &output.statuses {
        let code = s.code.map(|c| format!(" {c}")).unwrap_or_default();
        out.push_str(&format!("{} {}{}\n", s.signal_id, s.state.as_str(), code));
    }
    let m = &output.metrics;
    out.push_str(&format!(
        "\nsubmitted={} dispatched={} delivered={} rejected={} deduplicated={} dead_lettered={} expired={}\n",
        m.submitted, m.dispatched, m.delivered, m.rejected, m.deduplicated, m.dead_lettered, m.expired
    ));
    for g in &m.gates {
        let rate = g
            .pass_rate
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "gate {} {:<18} evaluated={} passed={} pass_rate={}\n",
            g.gate.number(),
            g.gate.as_str(),
            g.evaluated,
            g.passed,
            rate
        ));
    }
    out
}
