//! Operator use cases over a data directory and the catalog.

use anyhow::Context;
use camino::Utf8Path;
use irrigation_domain::policy::EffectiveConfig;
use irrigation_ledger::{
    AUDIT_FILE, DEAD_LETTER_FILE, DeadLetterStore, FileDeadLetters, LedgerError, PurgeSelection,
    verify_file,
};
use irrigation_registry::ConsumerTuning;
use irrigation_settings::ResolvedConfig;
use irrigation_types::{Capability, Category, ConsumerId, DeadLetterEntry, SignalType};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Serialize)]
pub struct CatalogRow {
    pub signal_type: SignalType,
    pub category: Category,
    pub source_phases: Vec<u8>,
    pub capability: Capability,
}

pub fn catalog_rows() -> Vec<CatalogRow> {
    SignalType::ALL
        .into_iter()
        .map(|t| CatalogRow {
            signal_type: t,
            category: t.category(),
            source_phases: t.legal_source_phases().to_vec(),
            capability: t.required_capability(),
        })
        .collect()
}

pub fn format_catalog(rows: &[CatalogRow]) -> String {
    let mut out = format!(
        "{:<24} {:<13} {:<12} {}\n",
        "SIGNAL TYPE", "CATEGORY", "PHASES", "CAPABILITY"
    );
    for row in rows {
        let phases: Vec<String> = row.source_phases.iter().map(u8::to_string).collect();
        out.push_str(&format!(
            "{:<24} {:<13} {:<12} {}\n",
            row.signal_type.as_str(),
            row.category.as_str(),
            phases.join(","),
            row.capability.as_str()
        ));
    }
    out
}

#[derive(Clone, Debug, Serialize)]
pub struct ConsumerSummary {
    pub consumer_id: ConsumerId,
    pub signal_types: BTreeSet<SignalType>,
    pub capabilities: BTreeSet<Capability>,
    pub scopes: Vec<String>,
    pub tuning: ConsumerTuning,
}

/// What `config check` prints.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigReport {
    pub effective: EffectiveConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    pub consumers: Vec<ConsumerSummary>,
}

impl From<&ResolvedConfig> for ConfigReport {
    fn from(resolved: &ResolvedConfig) -> Self {
        Self {
            effective: resolved.effective.clone(),
            data_dir: resolved.data_dir.as_ref().map(ToString::to_string),
            consumers: resolved
                .consumers
                .iter()
                .map(|c| ConsumerSummary {
                    consumer_id: c.consumer_id.clone(),
                    signal_types: c.signal_types.clone(),
                    capabilities: c.capabilities.clone(),
                    scopes: c.scopes.iter().map(ToString::to_string).collect(),
                    tuning: c.tuning.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AuditVerdict {
    Intact { entries: usize },
    Tampered { seq: Option<u64>, reason: String },
}

/// Re-hash the audit ledger in `data_dir`. A missing ledger is intact and empty.
pub fn verify_audit(data_dir: &Utf8Path) -> anyhow::Result<AuditVerdict> {
    let path = data_dir.join(AUDIT_FILE);
    match verify_file(&path) {
        Ok(entries) => Ok(AuditVerdict::Intact { entries }),
        Err(LedgerError::Chain(v)) => Ok(AuditVerdict::Tampered {
            seq: Some(v.seq),
            reason: v.reason,
        }),
        Err(LedgerError::Corrupt { line, detail, .. }) => Ok(AuditVerdict::Tampered {
            seq: None,
            reason: format!("line {line} is not a ledger entry: {detail}"),
        }),
        Err(e) => Err(e).with_context(|| format!("read audit ledger {path}")),
    }
}

fn dead_letter_store(data_dir: &Utf8Path) -> anyhow::Result<FileDeadLetters> {
    let path = data_dir.join(DEAD_LETTER_FILE);
    FileDeadLetters::open(&path).with_context(|| format!("open dead-letter sink {path}"))
}

/// Live dead letters in `data_dir`. A missing sink has none.
pub fn list_dead_letters(data_dir: &Utf8Path) -> anyhow::Result<Vec<DeadLetterEntry>> {
    if !data_dir.join(DEAD_LETTER_FILE).exists() {
        return Ok(Vec::new());
    }
    dead_letter_store(data_dir)?
        .list()
        .context("list dead letters")
}

pub fn purge_dead_letters(data_dir: &Utf8Path, selection: &PurgeSelection) -> anyhow::Result<usize> {
    if !data_dir.join(DEAD_LETTER_FILE).exists() {
        return Ok(0);
    }
    dead_letter_store(data_dir)?
        .purge(selection)
        .context("purge dead letters")
}

pub fn format_dead_letters(entries: &[DeadLetterEntry]) -> String {
    if entries.is_empty() {
        return "no dead letters\n".to_string();
    }
    let mut out = String::new();
    for e in entries {
        let consumer = e
            .consumer_id
            .as_ref()
            .map(|c| format!(" consumer={c}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "#{} {} {}{} {}\n",
            e.seq,
            e.signal.id(),
            e.code,
            consumer,
            e.detail
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_signal_type() {
        let rows = catalog_rows();
        assert_eq!(rows.len(), 17);
        let categories: BTreeSet<Category> = rows.iter().map(|r| r.category).collect();
        assert_eq!(categories.len(), 7);
    }

    #[test]
    fn catalog_table_has_one_line_per_type() {
        let text = format_catalog(&catalog_rows());
        assert_eq!(text.lines().count(), 18);
        assert!(text.starts_with("SIGNAL TYPE"));
        assert!(text.contains("SCORING_PRIMARY"));
    }

    #[test]
    fn missing_data_dir_is_empty_and_intact() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().join("nothing-here");
        assert_eq!(
            verify_audit(&root).unwrap(),
            AuditVerdict::Intact { entries: 0 }
        );
        assert!(list_dead_letters(&root).unwrap().is_empty());
        assert_eq!(purge_dead_letters(&root, &PurgeSelection::All).unwrap(), 0);
        assert!(!root.exists());
    }
}
