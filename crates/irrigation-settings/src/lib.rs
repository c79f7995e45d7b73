//! Config parsing and profile/preset resolution.
//!
//! This crate is IO-free: it parses and resolves configuration provided as strings.

#![forbid(unsafe_code)]

mod model;
mod presets;
mod resolve;

pub use model::{
    ChannelConfig, ConsumerConfig, DispatchConfig, IrrigationConfigV1, RegistryConfig,
    RetryConfig, ScopesConfig, StorageConfig, ValueAddConfig,
};
pub use presets::{PROFILES, preset};
pub use resolve::{Overrides, ResolvedConfig};

/// Parse `irrigation.toml` (or equivalent) into a typed model.
pub fn parse_config_toml(input: &str) -> anyhow::Result<IrrigationConfigV1> {
    let cfg: IrrigationConfigV1 = toml::from_str(input)?;
    Ok(cfg)
}

/// Resolve the effective config used by the core (profile + overrides + per-section config).
pub fn resolve_config(
    cfg: IrrigationConfigV1,
    overrides: Overrides,
) -> anyhow::Result<ResolvedConfig> {
    resolve::resolve_config(cfg, overrides)
}
