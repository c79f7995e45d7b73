//! The handler seam between the orchestrator and a stage's processing unit.

use async_trait::async_trait;
use irrigation_types::Signal;

/// What a consumer reports for one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Ack,
    /// Not processed; the orchestrator may retry.
    Nack(String),
}

#[async_trait]
pub trait Consumer: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Delivery;
}

/// Acknowledges every signal. Stands in for real handlers during replay.
#[derive(Clone, Copy, Debug, Default)]
pub struct AckingConsumer;

#[async_trait]
impl Consumer for AckingConsumer {
    async fn deliver(&self, _signal: &Signal) -> Delivery {
        Delivery::Ack
    }
}
