//! Closed reason-code enumeration and the pipeline stages that emit them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four ordered gates.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    ScopeAlignment,
    ValueAdd,
    Capability,
    IrrigationChannel,
}

impl Gate {
    pub const ORDER: [Gate; 4] = [
        Gate::ScopeAlignment,
        Gate::ValueAdd,
        Gate::Capability,
        Gate::IrrigationChannel,
    ];

    pub fn number(self) -> u8 {
        match self {
            Gate::ScopeAlignment => 1,
            Gate::ValueAdd => 2,
            Gate::Capability => 3,
            Gate::IrrigationChannel => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gate::ScopeAlignment => "scope_alignment",
            Gate::ValueAdd => "value_add",
            Gate::Capability => "capability",
            Gate::IrrigationChannel => "irrigation_channel",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gate {} ({})", self.number(), self.as_str())
    }
}

/// Where a signal (or one consumer's copy of it) was stopped.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ScopeAlignment,
    ValueAdd,
    Capability,
    IrrigationChannel,
    Dispatch,
    Expiry,
}

impl From<Gate> for Stage {
    fn from(g: Gate) -> Self {
        match g {
            Gate::ScopeAlignment => Stage::ScopeAlignment,
            Gate::ValueAdd => Stage::ValueAdd,
            Gate::Capability => Stage::Capability,
            Gate::IrrigationChannel => Stage::IrrigationChannel,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ScopeNotFound,
    InvalidScopeFormat,
    ScopeHierarchyViolation,
    LowValue,
    NoCapableConsumer,
    ChannelBlocked,
    DuplicateSignal,
    RateLimited,
    AuditFailure,
    ConsumerFailure,
    Expired,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::ScopeNotFound,
        ReasonCode::InvalidScopeFormat,
        ReasonCode::ScopeHierarchyViolation,
        ReasonCode::LowValue,
        ReasonCode::NoCapableConsumer,
        ReasonCode::ChannelBlocked,
        ReasonCode::DuplicateSignal,
        ReasonCode::RateLimited,
        ReasonCode::AuditFailure,
        ReasonCode::ConsumerFailure,
        ReasonCode::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::ScopeNotFound => "SCOPE_NOT_FOUND",
            ReasonCode::InvalidScopeFormat => "INVALID_SCOPE_FORMAT",
            ReasonCode::ScopeHierarchyViolation => "SCOPE_HIERARCHY_VIOLATION",
            ReasonCode::LowValue => "LOW_VALUE",
            ReasonCode::NoCapableConsumer => "NO_CAPABLE_CONSUMER",
            ReasonCode::ChannelBlocked => "CHANNEL_BLOCKED",
            ReasonCode::DuplicateSignal => "DUPLICATE_SIGNAL",
            ReasonCode::RateLimited => "RATE_LIMITED",
            ReasonCode::AuditFailure => "AUDIT_FAILURE",
            ReasonCode::ConsumerFailure => "CONSUMER_FAILURE",
            ReasonCode::Expired => "EXPIRED",
        }
    }

    pub fn parse(code: &str) -> Option<ReasonCode> {
        ReasonCode::ALL.into_iter().find(|c| c.as_str() == code)
    }

    pub fn stage(self) -> Stage {
        match self {
            ReasonCode::ScopeNotFound
            | ReasonCode::InvalidScopeFormat
            | ReasonCode::ScopeHierarchyViolation => Stage::ScopeAlignment,
            ReasonCode::LowValue => Stage::ValueAdd,
            ReasonCode::NoCapableConsumer => Stage::Capability,
            ReasonCode::ChannelBlocked
            | ReasonCode::DuplicateSignal
            | ReasonCode::RateLimited
            | ReasonCode::AuditFailure => Stage::IrrigationChannel,
            ReasonCode::ConsumerFailure => Stage::Dispatch,
            ReasonCode::Expired => Stage::Expiry,
        }
    }

    /// Environment-caused channel conditions that are worth re-attempting.
    pub fn is_retryable(self) -> bool {
        matches!(self, ReasonCode::ChannelBlocked | ReasonCode::RateLimited)
    }

    /// Failures that need operator attention beyond the dead-letter entry.
    pub fn escalates(self) -> bool {
        matches!(self, ReasonCode::AuditFailure)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_codes_map_to_their_gate() {
        assert_eq!(ReasonCode::ScopeNotFound.stage(), Stage::ScopeAlignment);
        assert_eq!(ReasonCode::LowValue.stage(), Stage::ValueAdd);
        assert_eq!(ReasonCode::NoCapableConsumer.stage(), Stage::Capability);
        assert_eq!(ReasonCode::AuditFailure.stage(), Stage::IrrigationChannel);
        assert_eq!(ReasonCode::ConsumerFailure.stage(), Stage::Dispatch);
    }

    #[test]
    fn only_channel_congestion_is_retryable() {
        let retryable: Vec<_> = ReasonCode::ALL
            .into_iter()
            .filter(|c| c.is_retryable())
            .collect();
        assert_eq!(
            retryable,
            vec![ReasonCode::ChannelBlocked, ReasonCode::RateLimited]
        );
    }

    #[test]
    fn codes_parse_from_wire_names() {
        for code in ReasonCode::ALL {
            assert_eq!(ReasonCode::parse(code.as_str()), Some(code));
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn gates_are_numbered_in_order() {
        let numbers: Vec<u8> = Gate::ORDER.iter().map(|g| g.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }
}
