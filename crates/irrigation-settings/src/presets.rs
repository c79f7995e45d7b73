use irrigation_domain::policy::{AckPolicy, EffectiveConfig};
use std::time::Duration;

/// Names accepted by [`preset`].
pub const PROFILES: [&str; 3] = ["standard", "strict", "lenient"];

/// Preset profiles are opinionated defaults.
///
/// Keep these small and readable. Anything deployment-specific goes into `irrigation.toml`.
pub fn preset(profile: &str) -> EffectiveConfig {
    match profile {
        "strict" => strict_profile(),
        "lenient" => lenient_profile(),
        // default
        _ => standard_profile(),
    }
}

fn standard_profile() -> EffectiveConfig {
    EffectiveConfig::default()
}

fn strict_profile() -> EffectiveConfig {
    let mut cfg = EffectiveConfig {
        profile: "strict".to_string(),
        ..EffectiveConfig::default()
    };
    cfg.value_add.threshold = 0.40;
    cfg.channel.dedup_window = Duration::from_secs(120);
    cfg.channel.max_channel_retries = 1;
    cfg.dispatch.ack_policy = AckPolicy::All;
    cfg.dispatch.circuit_failure_threshold = 3;
    cfg
}

fn lenient_profile() -> EffectiveConfig {
    // Lets thinner signals through and waits longer on a congested channel.
    let mut cfg = EffectiveConfig {
        profile: "lenient".to_string(),
        ..EffectiveConfig::default()
    };
    cfg.value_add.threshold = 0.20;
    cfg.channel.dedup_window = Duration::from_secs(30);
    cfg.channel.max_channel_retries = 5;
    cfg.channel.high_water_ratio = 0.9;
    cfg.dispatch.circuit_failure_threshold = 8;
    cfg
}
