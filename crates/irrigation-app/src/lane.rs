//! One consumer's delivery lane: a bounded queue, a worker bounded by `max_concurrent`, the
//! consumer's circuit breaker and, when the registration opts in, an in-process heartbeat.

use crate::breaker::{BreakerState, CircuitBreaker, Permit};
use crate::consumer::{Consumer, Delivery};
use crate::shared::Shared;
use irrigation_domain::model::ChannelLoad;
use irrigation_domain::policy::DispatchPolicy;
use irrigation_registry::ConsumerRegistration;
use irrigation_types::{ConsumerId, Signal};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub(crate) struct Job {
    pub(crate) signal: Arc<Signal>,
}

struct LaneInner {
    consumer_id: ConsumerId,
    registration: Arc<ConsumerRegistration>,
    handler: Arc<dyn Consumer>,
    /// Jobs accepted and not yet finished, retries included.
    depth: AtomicUsize,
    breaker: Mutex<CircuitBreaker>,
    shared: Weak<Shared>,
}

pub(crate) struct Lane {
    inner: Arc<LaneInner>,
    tx: mpsc::Sender<Job>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Lane {
    pub(crate) fn spawn(
        shared: Weak<Shared>,
        registration: Arc<ConsumerRegistration>,
        handler: Arc<dyn Consumer>,
        dispatch: &DispatchPolicy,
        heartbeat_every: Duration,
    ) -> Self {
        let tuning = &registration.tuning;
        let (tx, rx) = mpsc::channel(tuning.queue_capacity.max(1));
        let permits = usize::try_from(tuning.max_concurrent).unwrap_or(1).max(1);
        let inner = Arc::new(LaneInner {
            consumer_id: registration.consumer_id.clone(),
            breaker: Mutex::new(CircuitBreaker::new(
                dispatch.circuit_failure_threshold,
                dispatch.circuit_cooldown,
            )),
            depth: AtomicUsize::new(0),
            registration,
            handler,
            shared,
        });
        tokio::spawn(run_worker(inner.clone(), rx, permits));
        let heartbeat = inner
            .registration
            .tuning
            .self_heartbeat
            .then(|| tokio::spawn(run_heartbeat(inner.clone(), heartbeat_every)));
        Self {
            inner,
            tx,
            heartbeat,
        }
    }

    pub(crate) fn consumer_id(&self) -> &ConsumerId {
        &self.inner.consumer_id
    }

    pub(crate) fn load(&self) -> ChannelLoad {
        ChannelLoad {
            consumer_id: self.inner.consumer_id.clone(),
            depth: self.inner.depth.load(Ordering::SeqCst),
            capacity: self.inner.registration.tuning.queue_capacity,
        }
    }

    pub(crate) fn breaker_state(&self) -> BreakerState {
        self.inner.breaker.lock().state()
    }

    /// Queue a job. Gives it back if the worker has shut down.
    pub(crate) async fn enqueue(&self, job: Job) -> Result<(), Job> {
        self.inner.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(job).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(job)) => {
                self.inner.depth.fetch_sub(1, Ordering::SeqCst);
                Err(job)
            }
        }
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        // The worker drains what is already queued once the sender is gone.
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.abort();
        }
    }
}

async fn run_worker(lane: Arc<LaneInner>, mut rx: mpsc::Receiver<Job>, permits: usize) {
    let permits = Arc::new(Semaphore::new(permits));
    while let Some(job) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let lane = lane.clone();
        tokio::spawn(async move {
            lane.deliver(job).await;
            drop(permit);
        });
    }
    debug!(consumer_id = %lane.consumer_id, "consumer lane closed");
}

/// Keep an in-process consumer's contact fresh. Health itself moves only through reported
/// heartbeats and circuit changes.
async fn run_heartbeat(lane: Arc<LaneInner>, every: Duration) {
    let every = every.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    loop {
        ticker.tick().await;
        let Some(shared) = lane.shared.upgrade() else {
            break;
        };
        match shared.registry.keep_alive(&lane.consumer_id) {
            Ok(state) => debug!(consumer_id = %lane.consumer_id, state = state.as_str(), "heartbeat"),
            Err(_) => break,
        }
    }
}

impl LaneInner {
    async fn deliver(&self, job: Job) {
        let signal = job.signal;
        let retry = &self.registration.tuning.retry;
        let mut attempt: u32 = 0;
        loop {
            let Some(shared) = self.shared.upgrade() else {
                break;
            };
            if shared.expired_before_delivery(&signal, &self.consumer_id) {
                break;
            }
            attempt += 1;
            shared.delivery_started(signal.id(), &self.consumer_id, attempt);
            match self.attempt(&shared, &signal).await {
                Ok(()) => {
                    shared.delivery_acked(signal.id(), &self.consumer_id, attempt);
                    break;
                }
                Err(error) if attempt > retry.max_retries => {
                    shared.delivery_exhausted(&signal, &self.consumer_id, attempt, error);
                    break;
                }
                Err(error) => {
                    let wait = retry.backoff(attempt);
                    shared.delivery_retrying(signal.id(), &self.consumer_id, attempt, &error, wait);
                    drop(shared);
                    tokio::time::sleep(wait).await;
                }
            }
        }
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    async fn attempt(&self, shared: &Shared, signal: &Signal) -> Result<(), String> {
        let permit = self.breaker.lock().try_acquire(Instant::now());
        if permit == Permit::Denied {
            return Err("circuit open; consumer not contacted".to_string());
        }
        let timeout = self.registration.tuning.timeout;
        let outcome = match tokio::time::timeout(timeout, self.handler.deliver(signal)).await {
            Ok(Delivery::Ack) => Ok(()),
            Ok(Delivery::Nack(reason)) => Err(reason),
            Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
        };
        let change = {
            let mut breaker = self.breaker.lock();
            match &outcome {
                Ok(()) => breaker.record_success(),
                Err(_) => breaker.record_failure(Instant::now()),
            }
        };
        if let Some(state) = change {
            shared.circuit_changed(&self.consumer_id, state);
        }
        outcome
    }
}
