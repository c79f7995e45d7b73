//! Building an orchestrator from configuration.

use crate::consumer::Consumer;
use crate::orchestrator::Orchestrator;
use anyhow::{Context, bail};
use irrigation_ledger::{AUDIT_FILE, DEAD_LETTER_FILE, FileAuditLedger, FileDeadLetters};
use irrigation_settings::{IrrigationConfigV1, Overrides, ResolvedConfig};
use irrigation_types::ConsumerId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Code handlers for the consumers declared in `[[consumers]]`, keyed by id.
pub type Handlers = BTreeMap<ConsumerId, Arc<dyn Consumer>>;

/// Parse and resolve config text. Empty text resolves to the default profile.
pub fn load_config(config_text: &str, overrides: Overrides) -> anyhow::Result<ResolvedConfig> {
    let cfg = if config_text.trim().is_empty() {
        IrrigationConfigV1::default()
    } else {
        irrigation_settings::parse_config_toml(config_text).context("parse config")?
    };
    irrigation_settings::resolve_config(cfg, overrides).context("resolve config")
}

/// Open the stores named by `resolved` and register every configured consumer.
///
/// Each `[[consumers]]` entry needs a handler and each handler needs an entry.
pub fn build_orchestrator(
    resolved: ResolvedConfig,
    mut handlers: Handlers,
) -> anyhow::Result<Orchestrator> {
    let ResolvedConfig {
        effective,
        data_dir,
        consumers,
    } = resolved;

    let orchestrator = match data_dir {
        Some(dir) => {
            let ledger = FileAuditLedger::open(dir.join(AUDIT_FILE))
                .with_context(|| format!("open audit ledger in {dir}"))?;
            let dead_letters = FileDeadLetters::open(dir.join(DEAD_LETTER_FILE))
                .with_context(|| format!("open dead-letter sink in {dir}"))?;
            info!(data_dir = %dir, "using file-backed ledger and dead letters");
            Orchestrator::new(effective, Arc::new(ledger), Arc::new(dead_letters))
        }
        None => Orchestrator::in_memory(effective),
    };

    for registration in consumers {
        let id = registration.consumer_id.clone();
        let handler = handlers
            .remove(&id)
            .with_context(|| format!("no handler supplied for configured consumer {id}"))?;
        orchestrator
            .register(registration, handler)
            .with_context(|| format!("register consumer {id}"))?;
    }
    if let Some(extra) = handlers.keys().next() {
        bail!("handler supplied for {extra}, which has no [[consumers]] entry");
    }
    Ok(orchestrator)
}

/// [`load_config`] followed by [`build_orchestrator`].
pub fn build_from_toml(
    config_text: &str,
    overrides: Overrides,
    handlers: Handlers,
) -> anyhow::Result<Orchestrator> {
    build_orchestrator(load_config(config_text, overrides)?, handlers)
}
