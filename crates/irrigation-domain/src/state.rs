//! Mutable gate state: recorded scope facts, the dedup window and the global rate limiter.
//!
//! None of these lock; callers that share them across threads wrap them.

use crate::model::FactKey;
use irrigation_types::Scope;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
struct Known {
    owners: HashMap<FactKey, String>,
    /// Insertion order, oldest first.
    order: VecDeque<FactKey>,
}

/// Facts already delivered per scope, each remembered with the fingerprint that first carried it.
///
/// At most `per_scope` facts are kept for each scope; the oldest are forgotten first.
#[derive(Clone, Debug)]
pub struct ScopeFacts {
    per_scope: usize,
    by_scope: HashMap<Scope, Known>,
}

impl ScopeFacts {
    pub fn new(per_scope: usize) -> Self {
        Self {
            per_scope: per_scope.max(1),
            by_scope: HashMap::new(),
        }
    }

    /// How many of `facts` are new for every one of `scopes`.
    ///
    /// A fact first recorded under the same `fingerprint` does not count as seen, so an exact
    /// resubmission is judged by the dedup window rather than by the value gate.
    pub fn novel(&self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) -> usize {
        facts
            .iter()
            .filter(|fact| {
                !scopes.iter().any(|scope| {
                    self.by_scope
                        .get(scope)
                        .and_then(|known| known.owners.get(*fact))
                        .is_some_and(|owner| owner != fingerprint)
                })
            })
            .count()
    }

    pub fn record(&mut self, scopes: &[Scope], facts: &[FactKey], fingerprint: &str) {
        for scope in scopes {
            let known = self.by_scope.entry(*scope).or_default();
            for fact in facts {
                if known.owners.contains_key(fact) {
                    continue;
                }
                known.owners.insert(fact.clone(), fingerprint.to_string());
                known.order.push_back(fact.clone());
            }
            while known.order.len() > self.per_scope {
                if let Some(oldest) = known.order.pop_front() {
                    known.owners.remove(&oldest);
                }
            }
        }
    }

    pub fn facts_for(&self, scope: &Scope) -> usize {
        self.by_scope.get(scope).map(|k| k.owners.len()).unwrap_or(0)
    }
}

/// Fingerprints accepted within the last `window`.
#[derive(Clone, Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Claim `key`. Returns `false` when it is already held inside the window.
    pub fn reserve(&mut self, key: &str, now: Instant) -> bool {
        self.prune(now);
        if self.seen.contains_key(key) {
            return false;
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    /// Drop a reservation whose signal did not go on to be authorized.
    pub fn release(&mut self, key: &str) {
        self.seen.remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < window);
    }
}

/// Global token bucket.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, burst: u32, now: Instant) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            rate_per_sec,
            capacity,
            tokens: capacity,
            last: now,
        }
    }

    /// Give back a token taken by [`Self::try_acquire`], up to the burst capacity.
    pub fn refund(&mut self) {
        if self.rate_per_sec > 0.0 {
            self.tokens = (self.tokens + 1.0).min(self.capacity);
        }
    }

    /// Take one token, or report how long until the next one is available.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if self.rate_per_sec <= 0.0 {
            return Ok(());
        }
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(deficit / self.rate_per_sec))
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last = now;
    }
}
