//! Developer tasks (schema generation and conformance).
//!
//! Keeping this separate avoids bloating the operator CLI.

use anyhow::{Context, bail};
use irrigation_domain::{AuditSink, rejection_record};
use irrigation_ledger::{
    DeadLetter, DeadLetterStore, MemoryAuditLedger, MemoryDeadLetters, verify_chain,
};
use irrigation_types::ids::{SCHEMA_CONFIG_V1, SCHEMA_DEAD_LETTER_V1, SCHEMA_LEDGER_V1};
use irrigation_types::{Gate, GateVerdict, LedgerBody, ReasonCode, Signal, SignalType};
use schemars::schema_for;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Project root (parent of the xtask directory).
fn project_root() -> anyhow::Result<PathBuf> {
    let manifest_dir = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => std::env::current_dir().context("determine current directory")?,
    };
    if manifest_dir.ends_with("xtask") {
        return manifest_dir
            .parent()
            .map(PathBuf::from)
            .context("xtask has no parent directory");
    }
    Ok(manifest_dir)
}

fn schemas_dir() -> anyhow::Result<PathBuf> {
    Ok(project_root()?.join("schemas"))
}

/// Schema definition with its target filename.
struct SchemaSpec {
    id: &'static str,
    generate: fn() -> schemars::Schema,
}

impl SchemaSpec {
    fn filename(&self) -> String {
        format!("{}.json", self.id)
    }
}

fn schema_specs() -> Vec<SchemaSpec> {
    vec![
        SchemaSpec {
            id: SCHEMA_CONFIG_V1,
            generate: || schema_for!(irrigation_settings::IrrigationConfigV1),
        },
        SchemaSpec {
            id: SCHEMA_LEDGER_V1,
            generate: || schema_for!(irrigation_types::LedgerEntry),
        },
        SchemaSpec {
            id: SCHEMA_DEAD_LETTER_V1,
            generate: || schema_for!(irrigation_types::DeadLetterEntry),
        },
    ]
}

/// Pretty-printed JSON with a trailing newline.
fn serialize_schema(schema: &schemars::Schema) -> anyhow::Result<String> {
    let mut json = serde_json::to_string_pretty(schema).context("serialize schema")?;
    json.push('\n');
    Ok(json)
}

fn emit_schemas() -> anyhow::Result<()> {
    let dir = schemas_dir()?;
    fs::create_dir_all(&dir).context("create schemas directory")?;

    for spec in schema_specs() {
        let json = serialize_schema(&(spec.generate)())?;
        let path = dir.join(spec.filename());
        fs::write(&path, &json).with_context(|| format!("write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Fails if `schemas/` differs from what `emit_schemas` would write.
fn validate_schemas() -> anyhow::Result<()> {
    let dir = schemas_dir()?;
    let mut stale = Vec::new();

    for spec in schema_specs() {
        let path = dir.join(spec.filename());
        let expected = serialize_schema(&(spec.generate)())?;
        match fs::read_to_string(&path) {
            Ok(actual) if actual == expected => {}
            Ok(_) => stale.push(format!("{} (out of date)", spec.filename())),
            Err(_) => stale.push(format!("{} (missing)", spec.filename())),
        }
    }

    if stale.is_empty() {
        println!("All schemas are up to date.");
        return Ok(());
    }
    for name in &stale {
        eprintln!("  - {name}");
    }
    eprintln!("\nRun `cargo xtask schemas` to regenerate.");
    bail!("schema validation failed")
}

const SAMPLE_CONFIG: &str = r#"
schema = "irrigation.config.v1"
profile = "strict"

[value_add]
threshold = 0.35

[channel]
dedup_window_ms = 60000
rate_limit_per_sec = 50.0

[dispatch]
ack_policy = "any"

[storage]
data_dir = "var/irrigation"

[[consumers]]
id = "phase-5"
signal_types = ["SCORING_PRIMARY", "SCORING_ADJUSTMENT"]
scopes = ["Q*", "PA01"]
timeout_ms = 2000
"#;

/// Sample instances for each schema, produced by the real stores.
fn sample_instances() -> anyhow::Result<Vec<(&'static str, Value)>> {
    let config = irrigation_settings::parse_config_toml(SAMPLE_CONFIG)?;

    let signal = Signal::builder(SignalType::ScoringPrimary, 4)
        .scopes(["Q042", "PA02"])
        .payload(json!({"score": 0.82, "evidence": ["p.12 table 2"]}))
        .build()?;
    let verdicts = [GateVerdict {
        gate: Gate::ScopeAlignment,
        passed: false,
        bypassed: false,
        code: Some(ReasonCode::ScopeNotFound),
        score: None,
        detail: Some("unknown scope Q999".to_string()),
        latency_us: 14,
    }];

    let ledger = MemoryAuditLedger::new();
    let record = rejection_record(
        &signal,
        &verdicts,
        ReasonCode::ScopeNotFound,
        14,
        OffsetDateTime::now_utc(),
    );
    ledger.append(LedgerBody::Authorization(record))?;
    let entries = ledger.entries();
    verify_chain(&entries)?;

    let dead_letters = MemoryDeadLetters::new();
    let entry = dead_letters.append(DeadLetter::new(
        signal,
        ReasonCode::ScopeNotFound,
        "unknown scope Q999",
    ))?;

    let mut samples = vec![(SCHEMA_CONFIG_V1, serde_json::to_value(&config)?)];
    for e in &entries {
        samples.push((SCHEMA_LEDGER_V1, serde_json::to_value(e)?));
    }
    samples.push((SCHEMA_DEAD_LETTER_V1, serde_json::to_value(&entry)?));
    Ok(samples)
}

/// Validate sample instances against the generated schemas.
fn conform() -> anyhow::Result<()> {
    let specs = schema_specs();
    let mut errors = Vec::new();
    let mut count = 0;

    for (id, instance) in sample_instances()? {
        let spec = specs
            .iter()
            .find(|s| s.id == id)
            .with_context(|| format!("no schema registered for {id}"))?;
        let schema = serde_json::to_value((spec.generate)()).context("serialize schema")?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| anyhow::anyhow!("compile {id}: {e}"))?;
        for err in validator.iter_errors(&instance) {
            errors.push(format!("{id}: {err}"));
        }
        count += 1;
        println!("  ✓ {id} sample checked");
    }

    if !errors.is_empty() {
        eprintln!("\nConformance errors:");
        for err in &errors {
            eprintln!("  - {err}");
        }
        bail!("conformance failed with {} errors", errors.len());
    }
    println!("\n✓ All {count} samples conform.");
    Ok(())
}

fn print_help() {
    eprintln!("xtask commands:");
    eprintln!("  help              Show this message");
    eprintln!("  schemas           Generate JSON schemas from Rust types to schemas/");
    eprintln!("  validate-schemas  Check if schemas/ matches generated output (for CI)");
    eprintln!("  print-schema-ids  Print known schema IDs");
    eprintln!("  conform           Validate sample config, ledger and dead-letter entries");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match cmd {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "schemas" => emit_schemas(),
        "validate-schemas" => validate_schemas(),
        "conform" => conform(),
        "print-schema-ids" => {
            for spec in schema_specs() {
                println!("{}", spec.id);
            }
            Ok(())
        }
        other => bail!("unknown xtask command: {other}\n\nRun `cargo xtask help` for usage."),
    }
    .context("xtask failed")
}
