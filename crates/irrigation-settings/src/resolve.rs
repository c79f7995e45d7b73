use crate::model::{ConsumerConfig, IrrigationConfigV1, RetryConfig};
use crate::presets::{self, PROFILES};
use anyhow::Context;
use camino::Utf8PathBuf;
use irrigation_domain::policy::{AckPolicy, EffectiveConfig};
use irrigation_registry::{ConsumerRegistration, RetryPolicy};
use irrigation_types::ids::SCHEMA_CONFIG_V1;
use irrigation_types::{Capability, ConsumerId, ScopeSelector, SignalType};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub profile: Option<String>,
    pub ack_policy: Option<String>,
    pub value_threshold: Option<f64>,
    pub data_dir: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub effective: EffectiveConfig,
    /// Where the ledger and dead letters live. `None` keeps them in memory.
    pub data_dir: Option<Utf8PathBuf>,
    /// Validated registrations; handlers are attached by the factory.
    pub consumers: Vec<ConsumerRegistration>,
}

pub fn resolve_config(
    cfg: IrrigationConfigV1,
    overrides: Overrides,
) -> anyhow::Result<ResolvedConfig> {
    if let Some(schema) = cfg.schema.as_deref()
        && schema != SCHEMA_CONFIG_V1
    {
        anyhow::bail!("unsupported config schema: {schema} (expected {SCHEMA_CONFIG_V1})");
    }

    let profile = overrides
        .profile
        .clone()
        .or(cfg.profile.clone())
        .unwrap_or_else(|| "standard".to_string());
    if !PROFILES.contains(&profile.as_str()) {
        anyhow::bail!(
            "unknown profile: {profile} (expected {})",
            PROFILES.join("|")
        );
    }

    let mut effective = presets::preset(&profile);
    apply_sections(&cfg, &mut effective)?;

    if let Some(ack) = overrides.ack_policy.as_deref() {
        effective.dispatch.ack_policy = parse_ack_policy(ack)?;
    }
    if let Some(threshold) = overrides.value_threshold {
        effective.value_add.threshold = threshold;
    }

    validate_effective(&effective)?;

    let mut seen = BTreeSet::new();
    let mut consumers = Vec::with_capacity(cfg.consumers.len());
    for cc in &cfg.consumers {
        if !seen.insert(cc.id.clone()) {
            anyhow::bail!("consumer {} is declared more than once", cc.id);
        }
        let registration =
            consumer_registration(cc).with_context(|| format!("invalid consumer {}", cc.id))?;
        consumers.push(registration);
    }

    let data_dir = overrides
        .data_dir
        .or(cfg.storage.data_dir)
        .map(Utf8PathBuf::from);

    Ok(ResolvedConfig {
        effective,
        data_dir,
        consumers,
    })
}

fn apply_sections(cfg: &IrrigationConfigV1, effective: &mut EffectiveConfig) -> anyhow::Result<()> {
    let va = &cfg.value_add;
    let v = &mut effective.value_add;
    set(&mut v.threshold, va.threshold);
    set(&mut v.uniqueness_weight, va.uniqueness_weight);
    set(&mut v.density_weight, va.density_weight);
    set(&mut v.freshness_bonus, va.freshness_bonus);
    set(&mut v.freshness_window, va.freshness_window_ms.map(millis));
    set(&mut v.density_saturation, va.density_saturation);
    set(&mut v.facts_per_scope, va.facts_per_scope);

    let ch = &cfg.channel;
    let c = &mut effective.channel;
    set(&mut c.dedup_window, ch.dedup_window_ms.map(millis));
    set(&mut c.rate_limit_per_sec, ch.rate_limit_per_sec);
    set(&mut c.rate_limit_burst, ch.rate_limit_burst);
    set(&mut c.high_water_ratio, ch.high_water_ratio);
    set(&mut c.max_channel_retries, ch.max_channel_retries);
    set(&mut c.retry_backoff_initial, ch.retry_backoff_initial_ms.map(millis));
    set(&mut c.retry_backoff_max, ch.retry_backoff_max_ms.map(millis));

    let dc = &cfg.dispatch;
    let d = &mut effective.dispatch;
    if let Some(ack) = dc.ack_policy.as_deref() {
        d.ack_policy = parse_ack_policy(ack).context("invalid dispatch.ack_policy")?;
    }
    set(&mut d.circuit_failure_threshold, dc.circuit_failure_threshold);
    set(&mut d.circuit_cooldown, dc.circuit_cooldown_ms.map(millis));
    set(&mut d.event_buffer, dc.event_buffer);
    set(&mut d.status_retention, dc.status_retention);

    set(
        &mut effective.registry.heartbeat_max_age,
        cfg.registry.heartbeat_max_age_ms.map(millis),
    );

    let sc = &cfg.scopes;
    let s = &mut effective.scopes;
    set(&mut s.questions, sc.questions);
    set(&mut s.policy_areas, sc.policy_areas);
    set(&mut s.dimensions, sc.dimensions);
    set(&mut s.clusters, sc.clusters);
    set(&mut s.questions_per_cell, sc.questions_per_cell);
    Ok(())
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn validate_effective(e: &EffectiveConfig) -> anyhow::Result<()> {
    let v = &e.value_add;
    check_unit("value_add.threshold", v.threshold)?;
    check_unit("value_add.freshness_bonus", v.freshness_bonus)?;
    if v.uniqueness_weight < 0.0 || v.density_weight < 0.0 {
        anyhow::bail!("value_add weights must not be negative");
    }
    if v.uniqueness_weight + v.density_weight <= 0.0 {
        anyhow::bail!("value_add weights must not both be zero");
    }
    if v.density_saturation == 0 {
        anyhow::bail!("value_add.density_saturation must be at least 1");
    }
    if v.facts_per_scope == 0 {
        anyhow::bail!("value_add.facts_per_scope must be at least 1");
    }

    let c = &e.channel;
    if c.dedup_window.is_zero() {
        anyhow::bail!("channel.dedup_window_ms must be positive");
    }
    if !c.rate_limit_per_sec.is_finite() || c.rate_limit_per_sec < 0.0 {
        anyhow::bail!(
            "channel.rate_limit_per_sec must be a non-negative number, got {}",
            c.rate_limit_per_sec
        );
    }
    if c.rate_limit_burst == 0 {
        anyhow::bail!("channel.rate_limit_burst must be at least 1");
    }
    if !(c.high_water_ratio > 0.0 && c.high_water_ratio <= 1.0) {
        anyhow::bail!(
            "channel.high_water_ratio must be in (0, 1], got {}",
            c.high_water_ratio
        );
    }
    if c.retry_backoff_initial > c.retry_backoff_max {
        anyhow::bail!("channel.retry_backoff_initial_ms exceeds channel.retry_backoff_max_ms");
    }

    let d = &e.dispatch;
    if d.circuit_failure_threshold == 0 {
        anyhow::bail!("dispatch.circuit_failure_threshold must be at least 1");
    }
    if d.event_buffer == 0 {
        anyhow::bail!("dispatch.event_buffer must be at least 1");
    }
    if d.status_retention == 0 {
        anyhow::bail!("dispatch.status_retention must be at least 1");
    }
    if e.registry.heartbeat_max_age.is_zero() {
        anyhow::bail!("registry.heartbeat_max_age_ms must be positive");
    }

    let s = &e.scopes;
    check_count("scopes.questions", s.questions, 999)?;
    check_count("scopes.policy_areas", s.policy_areas, 99)?;
    check_count("scopes.dimensions", s.dimensions, 9)?;
    check_count("scopes.clusters", s.clusters, 99)?;
    check_count("scopes.questions_per_cell", s.questions_per_cell, 999)?;
    let layout = u32::from(s.policy_areas) * u32::from(s.dimensions) * u32::from(s.questions_per_cell);
    if layout < u32::from(s.questions) {
        anyhow::bail!(
            "scopes layout holds {layout} questions (policy_areas * dimensions * questions_per_cell) \
             but scopes.questions is {}",
            s.questions
        );
    }
    Ok(())
}

fn check_unit(field: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{field} must be in [0, 1], got {value}");
    }
    Ok(())
}

fn check_count(field: &str, value: u16, max: u16) -> anyhow::Result<()> {
    if value == 0 || value > max {
        anyhow::bail!("{field} must be in 1..={max}, got {value}");
    }
    Ok(())
}

fn parse_ack_policy(v: &str) -> anyhow::Result<AckPolicy> {
    match v {
        "any" => Ok(AckPolicy::Any),
        "all" => Ok(AckPolicy::All),
        other => anyhow::bail!("unknown ack policy: {other} (expected 'any' or 'all')"),
    }
}

fn consumer_registration(cc: &ConsumerConfig) -> anyhow::Result<ConsumerRegistration> {
    let id = ConsumerId::parse(&cc.id).context("consumer id must look like phase-N")?;
    let phase = cc.phase.unwrap_or_else(|| id.phase());

    let mut types = Vec::with_capacity(cc.signal_types.len());
    for name in &cc.signal_types {
        let t = SignalType::parse(name)
            .with_context(|| format!("unknown signal type: {name}"))?;
        types.push(t);
    }
    let mut scopes = Vec::with_capacity(cc.scopes.len());
    for raw in &cc.scopes {
        scopes.push(
            ScopeSelector::parse(raw).with_context(|| format!("invalid scope selector: {raw}"))?,
        );
    }

    let mut reg = ConsumerRegistration::for_phase(phase)?.serving(scopes);
    reg.consumer_id = id;
    if cc.capabilities.is_empty() {
        reg = reg.accepting(types);
    } else {
        reg.signal_types = types.into_iter().collect();
        for token in &cc.capabilities {
            let cap = Capability::parse(token)
                .with_context(|| format!("unknown capability: {token}"))?;
            reg.capabilities.insert(cap);
        }
    }

    let t = &mut reg.tuning;
    set(&mut t.priority, cc.priority);
    set(&mut t.max_concurrent, cc.max_concurrent);
    set(&mut t.timeout, cc.timeout_ms.map(millis));
    set(&mut t.queue_capacity, cc.queue_capacity);
    set(&mut t.self_heartbeat, cc.self_heartbeat);
    if let Some(retry) = &cc.retry {
        apply_retry(&mut t.retry, retry);
    }

    reg.validate()?;
    Ok(reg)
}

fn apply_retry(policy: &mut RetryPolicy, rc: &RetryConfig) {
    set(&mut policy.max_retries, rc.max_retries);
    set(&mut policy.initial_backoff, rc.initial_backoff_ms.map(millis));
    set(&mut policy.max_backoff, rc.max_backoff_ms.map(millis));
    set(&mut policy.multiplier, rc.multiplier);
}
