//! scdk-job
//!
//! One historization run: read the source snapshot and the destination
//! history, reconcile, replace the destination table. Retries (when
//! configured) wrap the whole operation and only cover transient storage
//! failures; integrity errors from the engine are returned on first sight.

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use scdk_config::{ComparatorKind, JobConfig};
use scdk_reconcile::{
    reconcile_with, rows_as_of, verify_history, EntityAction, HistoryAudit, KeyGenerator,
    NormalizingComparator, ReconcileError, ReconcileOptions, SchemaMismatch, StrictComparator,
    ValueComparator,
};
use scdk_store::{HistoryReader, HistoryTable, HistoryWriter, SnapshotReader, StoreError};
use tracing::{debug, info, info_span, warn};

/// Storage endpoints for one run.
#[derive(Clone, Copy)]
pub struct JobIo<'a> {
    pub snapshot: &'a dyn SnapshotReader,
    pub history: &'a dyn HistoryReader,
    pub writer: &'a dyn HistoryWriter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    pub as_of: NaiveDate,
    /// Reconcile and report, but do not write.
    pub dry_run: bool,
}

/// What a run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub as_of: NaiveDate,
    pub snapshot_rows: usize,
    pub history_rows_before: usize,
    pub history_rows_after: usize,
    pub inserted: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub untouched: usize,
    /// `false` on dry runs and on no-op runs against an existing table.
    pub written: bool,
    pub attempts: u32,
}

pub fn comparator_for(kind: ComparatorKind) -> &'static dyn ValueComparator {
    match kind {
        ComparatorKind::Normalized => &NormalizingComparator,
        ComparatorKind::Strict => &StrictComparator,
    }
}

/// Run with the configured retry policy.
pub fn run_historize(
    cfg: &JobConfig,
    io: JobIo<'_>,
    opts: &RunOptions,
    keys: &mut dyn KeyGenerator,
) -> Result<RunSummary> {
    let span = info_span!(
        "historize",
        source = %cfg.source_table,
        destination = %cfg.destination_table,
        as_of = %opts.as_of,
    );
    let _guard = span.enter();

    let max_attempts = cfg.retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match run_once(cfg, io, opts, keys) {
            Ok(mut summary) => {
                summary.attempts = attempt;
                info!(
                    inserted = summary.inserted,
                    changed = summary.changed,
                    unchanged = summary.unchanged,
                    untouched = summary.untouched,
                    rows = summary.history_rows_after,
                    written = summary.written,
                    attempts = attempt,
                    "historize run complete"
                );
                return Ok(summary);
            }
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                warn!(attempt, max_attempts, error = %format!("{e:#}"), "transient storage failure; retrying whole run");
                if cfg.retry.backoff_ms > 0 {
                    thread::sleep(Duration::from_millis(cfg.retry.backoff_ms));
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(e: &anyhow::Error) -> bool {
    e.downcast_ref::<StoreError>()
        .map(StoreError::is_transient)
        .unwrap_or(false)
}

fn run_once(
    cfg: &JobConfig,
    io: JobIo<'_>,
    opts: &RunOptions,
    keys: &mut dyn KeyGenerator,
) -> Result<RunSummary> {
    let snapshot = io
        .snapshot
        .read_snapshot()
        .with_context(|| format!("read source table '{}'", cfg.source_table))?;
    let loaded = io
        .history
        .read_history()
        .with_context(|| format!("read history table '{}'", cfg.destination_table))?;

    if !snapshot.columns.iter().any(|c| c == &cfg.id_column) {
        bail!(
            "identifier column '{}' not found in source table '{}' (columns: {:?})",
            cfg.id_column,
            cfg.source_table,
            snapshot.columns
        );
    }

    let existed = loaded.table.is_some();
    let (attribute_columns, history_rows) = match loaded.table {
        Some(table) => {
            check_columns(&snapshot.columns, &table.attribute_columns)?;
            (table.attribute_columns, table.rows)
        }
        None => {
            info!("history table absent; treating as first run");
            (snapshot.columns.clone(), Vec::new())
        }
    };
    let history_rows_before = history_rows.len();

    let outcome = reconcile_with(
        &snapshot.rows,
        history_rows,
        &ReconcileOptions::new(cfg.id_column.clone(), opts.as_of),
        comparator_for(cfg.comparator),
        keys,
    )?;

    for entity in &outcome.report.entities {
        match &entity.action {
            EntityAction::FirstSeen { new_key } => {
                debug!(identifier = %entity.identifier, new_key = %new_key, "first-seen insert");
            }
            EntityAction::Changed {
                closed_key,
                new_key,
                changes,
            } => {
                let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
                debug!(
                    identifier = %entity.identifier,
                    closed_key = %closed_key,
                    new_key = %new_key,
                    fields = ?fields,
                    "version split"
                );
            }
            EntityAction::Unchanged { .. } => {}
        }
    }

    let report = &outcome.report;
    let mut summary = RunSummary {
        as_of: opts.as_of,
        snapshot_rows: snapshot.rows.len(),
        history_rows_before,
        history_rows_after: outcome.rows.len(),
        inserted: report.inserted_count(),
        changed: report.changed_count(),
        unchanged: report.unchanged_count(),
        untouched: report.untouched.len(),
        written: false,
        attempts: 0,
    };

    if opts.dry_run {
        info!("dry run; destination not written");
        return Ok(summary);
    }
    if existed && report.is_noop() {
        info!("no changes; destination left as is");
        return Ok(summary);
    }

    let table = HistoryTable {
        attribute_columns,
        rows: outcome.rows,
    };
    io.writer
        .replace_history(&table, &loaded.version)
        .with_context(|| format!("replace history table '{}'", cfg.destination_table))?;
    summary.written = true;
    Ok(summary)
}

/// Header-level schema check. Catches drift even when the history has no rows.
fn check_columns(snapshot: &[String], history: &[String]) -> Result<(), ReconcileError> {
    let s: BTreeSet<&str> = snapshot.iter().map(String::as_str).collect();
    let h: BTreeSet<&str> = history.iter().map(String::as_str).collect();
    if s == h {
        return Ok(());
    }
    Err(ReconcileError::SchemaMismatch(SchemaMismatch::SnapshotVsHistory {
        missing_in_snapshot: h.difference(&s).map(|c| c.to_string()).collect(),
        missing_in_history: s.difference(&h).map(|c| c.to_string()).collect(),
    }))
}

/// Audit the destination table. An absent table is clean and empty.
pub fn verify_destination(cfg: &JobConfig, history: &dyn HistoryReader) -> Result<HistoryAudit> {
    let loaded = history
        .read_history()
        .with_context(|| format!("read history table '{}'", cfg.destination_table))?;
    let rows = loaded.table.map(|t| t.rows).unwrap_or_default();
    let audit = verify_history(&rows, &cfg.id_column);
    info!(
        rows = audit.rows,
        identifiers = audit.identifiers,
        violations = audit.violations.len(),
        "history audit complete"
    );
    Ok(audit)
}

/// Destination rows in effect on `date`, same column layout as the table.
pub fn history_as_of(cfg: &JobConfig, history: &dyn HistoryReader, date: NaiveDate) -> Result<HistoryTable> {
    let loaded = history
        .read_history()
        .with_context(|| format!("read history table '{}'", cfg.destination_table))?;
    let Some(table) = loaded.table else {
        bail!("history table '{}' does not exist", cfg.destination_table);
    };
    let rows = rows_as_of(&table.rows, date).into_iter().cloned().collect();
    Ok(HistoryTable {
        attribute_columns: table.attribute_columns,
        rows,
    })
}
