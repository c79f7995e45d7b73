//! Stable schema identifiers for persisted and user-facing documents.

pub const SCHEMA_CONFIG_V1: &str = "irrigation.config.v1";
pub const SCHEMA_LEDGER_V1: &str = "irrigation.ledger.v1";
pub const SCHEMA_DEAD_LETTER_V1: &str = "irrigation.dead_letter.v1";

/// Version number carried by the resolved configuration.
pub const CONFIG_VERSION: u32 = 1;
