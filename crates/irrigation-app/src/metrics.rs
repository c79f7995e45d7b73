//! In-process counters, gate pass rates and latency histograms.

use irrigation_types::{Gate, GateVerdict};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bounds (inclusive, microseconds) of the latency buckets. A final overflow bucket
/// catches everything slower.
pub const LATENCY_BUCKETS_US: [u64; 10] = [
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000,
];

#[derive(Debug, Default)]
struct Histogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_US.len() + 1],
    count: AtomicU64,
    sum_us: AtomicU64,
}

impl Histogram {
    fn observe(&self, us: u64) {
        let idx = LATENCY_BUCKETS_US
            .iter()
            .position(|bound| us <= *bound)
            .unwrap_or(LATENCY_BUCKETS_US.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(us, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let buckets = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, c)| BucketCount {
                le_us: LATENCY_BUCKETS_US.get(i).copied(),
                count: c.load(Ordering::Relaxed),
            })
            .collect();
        HistogramSnapshot {
            buckets,
            count: self.count.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct GateCounters {
    evaluated: AtomicU64,
    passed: AtomicU64,
    latency: Histogram,
}

/// Which counter to bump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Counter {
    Submitted,
    /// Signals authorized and handed to consumer queues.
    Dispatched,
    /// Consumer acknowledgements.
    Delivered,
    /// Terminal gate rejections.
    Rejected,
    Deduplicated,
    DeadLettered,
    Expired,
    GateRetries,
    DeliveryRetries,
}

#[derive(Debug, Default)]
pub struct Metrics {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
    deduplicated: AtomicU64,
    dead_lettered: AtomicU64,
    expired: AtomicU64,
    gate_retries: AtomicU64,
    delivery_retries: AtomicU64,
    gates: [GateCounters; 4],
}

impl Metrics {
    pub(crate) fn incr(&self, counter: Counter) {
        let c = match counter {
            Counter::Submitted => &self.submitted,
            Counter::Dispatched => &self.dispatched,
            Counter::Delivered => &self.delivered,
            Counter::Rejected => &self.rejected,
            Counter::Deduplicated => &self.deduplicated,
            Counter::DeadLettered => &self.dead_lettered,
            Counter::Expired => &self.expired,
            Counter::GateRetries => &self.gate_retries,
            Counter::DeliveryRetries => &self.delivery_retries,
        };
        c.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_verdicts(&self, verdicts: &[GateVerdict]) {
        for v in verdicts {
            let g = &self.gates[usize::from(v.gate.number() - 1)];
            g.evaluated.fetch_add(1, Ordering::Relaxed);
            if v.passed {
                g.passed.fetch_add(1, Ordering::Relaxed);
            }
            g.latency.observe(v.latency_us);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let gates = Gate::ORDER
            .iter()
            .zip(&self.gates)
            .map(|(gate, c)| {
                let evaluated = load(&c.evaluated);
                let passed = load(&c.passed);
                GateSnapshot {
                    gate: *gate,
                    evaluated,
                    passed,
                    pass_rate: (evaluated > 0).then(|| passed as f64 / evaluated as f64),
                    latency: c.latency.snapshot(),
                }
            })
            .collect();
        MetricsSnapshot {
            submitted: load(&self.submitted),
            dispatched: load(&self.dispatched),
            delivered: load(&self.delivered),
            rejected: load(&self.rejected),
            deduplicated: load(&self.deduplicated),
            dead_lettered: load(&self.dead_lettered),
            expired: load(&self.expired),
            gate_retries: load(&self.gate_retries),
            delivery_retries: load(&self.delivery_retries),
            gates,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BucketCount {
    /// `None` for the overflow bucket.
    pub le_us: Option<u64>,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<BucketCount>,
    pub count: u64,
    pub sum_us: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GateSnapshot {
    pub gate: Gate,
    pub evaluated: u64,
    pub passed: u64,
    /// `None` until the gate has been evaluated at least once.
    pub pass_rate: Option<f64>,
    pub latency: HistogramSnapshot,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub deduplicated: u64,
    pub dead_lettered: u64,
    pub expired: u64,
    pub gate_retries: u64,
    pub delivery_retries: u64,
    pub gates: Vec<GateSnapshot>,
}

impl MetricsSnapshot {
    pub fn gate(&self, gate: Gate) -> &GateSnapshot {
        &self.gates[usize::from(gate.number() - 1)]
    }
}
