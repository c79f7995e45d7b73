//! CLI entry point for irrigation.
//!
//! This module is intentionally thin: it handles argument parsing, I/O, and exit codes.
//! All business logic lives in the `irrigation-app` crate.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgGroup, Parser, Subcommand};
use irrigation_app::{
    AuditVerdict, ConfigReport, ExplainOutput, ReplayInput, catalog_rows, format_catalog,
    format_dead_letters, format_explanation, format_not_found, format_replay, list_dead_letters,
    load_config, purge_dead_letters, run_explain, run_replay, verify_audit,
};
use irrigation_ledger::PurgeSelection;
use irrigation_settings::Overrides;
use irrigation_types::SignalId;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "irrigation",
    version,
    about = "Operator tooling for the irrigation signal router"
)]
struct Cli {
    /// Path to irrigation config TOML. A missing file means defaults.
    #[arg(long, global = true, default_value = "irrigation.toml")]
    config: Utf8PathBuf,

    /// Override profile (standard|strict|lenient).
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Override dispatch ack policy (any|all).
    #[arg(long, global = true)]
    ack_policy: Option<String>,

    /// Override the value-add threshold.
    #[arg(long, global = true)]
    value_threshold: Option<f64>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// Explain a reason code with remediation guidance.
    Explain {
        /// The reason code (e.g., "RATE_LIMITED").
        code: String,
    },

    /// List the signal catalog.
    Catalog {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or purge the dead-letter sink.
    DeadLetters {
        #[command(subcommand)]
        cmd: DeadLetterCommands,
    },

    /// Audit ledger operations.
    Audit {
        #[command(subcommand)]
        cmd: AuditCommands,
    },

    /// Submit recorded signals to an in-process orchestrator whose consumers all acknowledge.
    Replay {
        /// JSONL file, one signal per line.
        #[arg(long)]
        signals: Utf8PathBuf,

        /// Persist the ledger and dead letters here instead of in memory.
        #[arg(long)]
        data_dir: Option<Utf8PathBuf>,

        /// How long to wait for each signal to settle.
        #[arg(long, default_value = "30000")]
        settle_timeout_ms: u64,

        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Parse and resolve the config, then print the effective settings as JSON.
    Check {
        /// Override the storage data directory.
        #[arg(long)]
        data_dir: Option<Utf8PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum DeadLetterCommands {
    /// Print live dead letters.
    List {
        #[arg(long)]
        data_dir: Utf8PathBuf,

        /// Print JSON instead of one line per entry.
        #[arg(long)]
        json: bool,
    },

    /// Tombstone dead letters so they no longer list.
    #[command(group(ArgGroup::new("selection").required(true).args(["signal", "seq", "all"])))]
    Purge {
        #[arg(long)]
        data_dir: Utf8PathBuf,

        /// Purge every entry for this signal id.
        #[arg(long)]
        signal: Option<String>,

        /// Purge entries by sequence number. Repeatable.
        #[arg(long)]
        seq: Vec<u64>,

        /// Purge everything.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCommands {
    /// Re-hash the ledger chain. Exits 2 if it was tampered with.
    Verify {
        #[arg(long)]
        data_dir: Utf8PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.cmd {
        Commands::Config {
            cmd: ConfigCommands::Check { data_dir },
        } => cmd_config_check(&cli, data_dir.as_deref()),
        Commands::Explain { code } => cmd_explain(code),
        Commands::Catalog { json } => cmd_catalog(*json),
        Commands::DeadLetters { cmd } => match cmd {
            DeadLetterCommands::List { data_dir, json } => cmd_dead_letters_list(data_dir, *json),
            DeadLetterCommands::Purge {
                data_dir,
                signal,
                seq,
                all,
            } => cmd_dead_letters_purge(data_dir, signal.as_deref(), seq, *all),
        },
        Commands::Audit {
            cmd: AuditCommands::Verify { data_dir },
        } => cmd_audit_verify(data_dir),
        Commands::Replay {
            signals,
            data_dir,
            settle_timeout_ms,
            json,
        } => cmd_replay(
            &cli,
            signals,
            data_dir.as_deref(),
            Duration::from_millis(*settle_timeout_ms),
            *json,
        ),
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` controls the level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn overrides(cli: &Cli, data_dir: Option<&Utf8Path>) -> Overrides {
    Overrides {
        profile: cli.profile.clone(),
        ack_policy: cli.ack_policy.clone(),
        value_threshold: cli.value_threshold,
        data_dir: data_dir.map(ToString::to_string),
    }
}

/// Missing config file is allowed (defaults apply).
fn read_config(path: &Utf8Path) -> anyhow::Result<String> {
    if !path.exists() {
        tracing::debug!(path = %path, "config file not found; using defaults");
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("read config: {path}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

fn cmd_config_check(cli: &Cli, data_dir: Option<&Utf8Path>) -> anyhow::Result<()> {
    let text = read_config(&cli.config)?;
    let resolved = load_config(&text, overrides(cli, data_dir))?;
    print_json(&ConfigReport::from(&resolved))
}

fn cmd_explain(code: &str) -> anyhow::Result<()> {
    match run_explain(code) {
        ExplainOutput::Found { code, explanation } => {
            print!("{}", format_explanation(code, &explanation));
            Ok(())
        }
        ExplainOutput::NotFound {
            identifier,
            available_codes,
        } => {
            eprint!("{}", format_not_found(&identifier, available_codes));
            std::process::exit(1);
        }
    }
}

fn cmd_catalog(json: bool) -> anyhow::Result<()> {
    let rows = catalog_rows();
    if json {
        return print_json(&rows);
    }
    print!("{}", format_catalog(&rows));
    Ok(())
}

fn cmd_dead_letters_list(data_dir: &Utf8Path, json: bool) -> anyhow::Result<()> {
    let entries = list_dead_letters(data_dir)?;
    if json {
        return print_json(&entries);
    }
    print!("{}", format_dead_letters(&entries));
    Ok(())
}

fn cmd_dead_letters_purge(
    data_dir: &Utf8Path,
    signal: Option<&str>,
    seqs: &[u64],
    all: bool,
) -> anyhow::Result<()> {
    let selection = match (signal, all) {
        (_, true) => PurgeSelection::All,
        (Some(id), false) => PurgeSelection::Signal(SignalId::new(id)),
        (None, false) => PurgeSelection::Seqs(seqs.to_vec()),
    };
    let purged = purge_dead_letters(data_dir, &selection)?;
    println!("purged {purged} dead letter(s)");
    Ok(())
}

fn cmd_audit_verify(data_dir: &Utf8Path) -> anyhow::Result<()> {
    let verdict = verify_audit(data_dir)?;
    print_json(&verdict)?;
    if let AuditVerdict::Tampered { seq, reason } = &verdict {
        match seq {
            Some(seq) => eprintln!("irrigation: audit ledger tampered at seq {seq}: {reason}"),
            None => eprintln!("irrigation: audit ledger tampered: {reason}"),
        }
        std::process::exit(2);
    }
    Ok(())
}

fn cmd_replay(
    cli: &Cli,
    signals: &Utf8Path,
    data_dir: Option<&Utf8Path>,
    settle_timeout: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let config_text = read_config(&cli.config)?;
    let signals_text =
        std::fs::read_to_string(signals).with_context(|| format!("read signals: {signals}"))?;
    let input = ReplayInput {
        config_text: &config_text,
        overrides: overrides(cli, data_dir),
        signals_text: &signals_text,
        settle_timeout,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    let output = runtime.block_on(run_replay(input))?;

    if json {
        return print_json(&output);
    }
    print!("{}", format_replay(&output));
    Ok(())
}
