use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::{info, warn};

use scdk_config::{LoadedConfig, UnusedKeyPolicy};
use scdk_job::{history_as_of, run_historize, verify_destination, JobIo, RunOptions};
use scdk_reconcile::UuidKeys;
use scdk_store::{encode_history, CsvDataset};

/// Fallback run date when `--as-of` is not given.
const ENV_AS_OF: &str = "SCDK_AS_OF";

#[derive(Parser)]
#[command(name = "scdk")]
#[command(about = "Slowly-changing-dimension (type 2) historization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Historize the source table into the destination table
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Effective date (YYYY-MM-DD). Defaults to $SCDK_AS_OF, then today.
        #[arg(long)]
        as_of: Option<String>,

        /// Reconcile and print counts without writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Audit the destination table's versioning invariants
    Verify {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Print the destination rows in effect on a date, as CSV
    AsOf {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        date: String,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> job ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run {
            config_paths,
            as_of,
            dry_run,
        } => {
            let loaded = load_config(&config_paths)?;
            let cfg = loaded.job()?;
            let as_of = resolve_as_of(as_of.as_deref())?;
            info!(config_hash = %loaded.config_hash, %as_of, dry_run, "starting historize run");

            let ds = CsvDataset::new(&cfg.dataset);
            let snapshot = ds.snapshot_table(&cfg.source_table);
            let history = ds.history_table(&cfg.destination_table);
            let io = JobIo {
                snapshot: &snapshot,
                history: &history,
                writer: &history,
            };

            let summary = run_historize(&cfg, io, &RunOptions { as_of, dry_run }, &mut UuidKeys)?;

            println!("config_hash={}", loaded.config_hash);
            println!("as_of={}", summary.as_of);
            println!("dry_run={}", dry_run);
            println!("snapshot_rows={}", summary.snapshot_rows);
            println!("history_rows_before={}", summary.history_rows_before);
            println!("history_rows_after={}", summary.history_rows_after);
            println!("inserted={}", summary.inserted);
            println!("changed={}", summary.changed);
            println!("unchanged={}", summary.unchanged);
            println!("untouched={}", summary.untouched);
            println!("written={}", summary.written);
            println!("attempts={}", summary.attempts);
        }

        Commands::Verify { config_paths } => {
            let loaded = load_config(&config_paths)?;
            let cfg = loaded.job()?;
            let history = CsvDataset::new(&cfg.dataset).history_table(&cfg.destination_table);

            let audit = verify_destination(&cfg, &history)?;
            println!("rows={}", audit.rows);
            println!("identifiers={}", audit.identifiers);
            println!("violations={}", audit.violations.len());
            for v in &audit.violations {
                println!("violation={:?}", v);
            }
            if !audit.is_clean() {
                bail!(
                    "HISTORY_INVALID: {} violation(s) in '{}'",
                    audit.violations.len(),
                    cfg.destination_table
                );
            }
        }

        Commands::AsOf { config_paths, date } => {
            let loaded = load_config(&config_paths)?;
            let cfg = loaded.job()?;
            let date = parse_date(&date).context("invalid --date")?;
            let history = CsvDataset::new(&cfg.dataset).history_table(&cfg.destination_table);

            let table = history_as_of(&cfg, &history, date)?;
            let bytes = encode_history(&table, "<stdout>")?;
            std::io::stdout()
                .write_all(&bytes)
                .context("failed to write to stdout")?;
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = scdk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = scdk_config::load_layered_yaml(&path_refs)?;

    let report = scdk_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "unused config key");
    }
    Ok(loaded)
}

fn resolve_as_of(flag: Option<&str>) -> Result<NaiveDate> {
    if let Some(s) = flag {
        return parse_date(s).context("invalid --as-of");
    }
    match std::env::var(ENV_AS_OF) {
        Ok(s) if !s.trim().is_empty() => parse_date(&s).with_context(|| format!("invalid {ENV_AS_OF}")),
        _ => Ok(Local::now().date_naive()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{}'", s))
}
