//! The four gates, in evaluation order.

use irrigation_types::ReasonCode;

pub mod capability;
pub mod irrigation_channel;
pub mod scope_alignment;
pub mod value_add;

/// A gate stopped the signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateFailure {
    pub code: ReasonCode,
    pub detail: String,
}

impl GateFailure {
    pub fn new(code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}
