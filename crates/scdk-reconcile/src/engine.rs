use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::compare::identifier_key;
use crate::{
    Attributes, EntityAction, EntityOutcome, EntityRow, FieldChange, HistorizedRow, KeyGenerator,
    NormalizingComparator, ReconcileError, ReconcileOptions, ReconcileOutcome, ReconcileReport,
    RowOrigin, SchemaMismatch, UuidKeys, ValueComparator,
};

/// Reconcile with the production defaults: normalizing comparator, random v4 keys.
///
/// Returns the complete replacement history table.
pub fn reconcile(
    snapshot: &[EntityRow],
    history: Vec<HistorizedRow>,
    id_field: &str,
    as_of: NaiveDate,
) -> Result<Vec<HistorizedRow>, ReconcileError> {
    let opts = ReconcileOptions::new(id_field, as_of);
    reconcile_with(snapshot, history, &opts, &NormalizingComparator, &mut UuidKeys)
        .map(|outcome| outcome.rows)
}

/// Deterministic SCD2 reconciliation:
/// - identifier without a current version => first-seen insert
/// - current version equivalent to the snapshot row => carried forward
/// - current version differs => closed at `as_of`, new current version opened
/// - current version with no snapshot row => untouched
///
/// Validation runs before any version is touched, in this order: schema,
/// identifiers, corrupt history, duplicate snapshot identifiers. Either the
/// complete table is returned or nothing is.
pub fn reconcile_with(
    snapshot: &[EntityRow],
    mut history: Vec<HistorizedRow>,
    opts: &ReconcileOptions,
    comparator: &dyn ValueComparator,
    keys: &mut dyn KeyGenerator,
) -> Result<ReconcileOutcome, ReconcileError> {
    check_schema(snapshot, &history)?;

    let history_ids = history
        .iter()
        .enumerate()
        .map(|(i, row)| require_id(row.get(&opts.id_field), RowOrigin::History, i, &opts.id_field))
        .collect::<Result<Vec<_>, _>>()?;
    let snapshot_ids = snapshot
        .iter()
        .enumerate()
        .map(|(i, row)| require_id(row.get(&opts.id_field), RowOrigin::Snapshot, i, &opts.id_field))
        .collect::<Result<Vec<_>, _>>()?;

    // 1) identifier -> index of its current version
    let current = index_current(&history, &history_ids)?;

    // 2) duplicate snapshot identifiers
    let mut first_seen_at: HashMap<&str, usize> = HashMap::with_capacity(snapshot_ids.len());
    for (i, id) in snapshot_ids.iter().enumerate() {
        if let Some(&first) = first_seen_at.get(id.as_str()) {
            return Err(ReconcileError::DuplicateIdentifier {
                identifier: id.clone(),
                first_index: first,
                second_index: i,
            });
        }
        first_seen_at.insert(id.as_str(), i);
    }

    // 3) classify each snapshot entity, in input order
    let mut report = ReconcileReport::empty(opts.as_of);
    let mut opened: Vec<(String, HistorizedRow)> = Vec::new();

    for (row, id) in snapshot.iter().zip(&snapshot_ids) {
        let Some(&idx) = current.get(id) else {
            let new_key = keys.next_key(id, opts.as_of);
            opened.push((
                id.clone(),
                HistorizedRow::open(new_key.clone(), opts.as_of, row.attributes.clone()),
            ));
            report.entities.push(EntityOutcome {
                identifier: id.clone(),
                action: EntityAction::FirstSeen { new_key },
            });
            continue;
        };

        let existing = &mut history[idx];
        let changes = diff_attributes(&existing.attributes, &row.attributes, comparator);
        if changes.is_empty() {
            report.entities.push(EntityOutcome {
                identifier: id.clone(),
                action: EntityAction::Unchanged {
                    current_key: existing.technical_key.clone(),
                },
            });
            continue;
        }

        if opts.as_of < existing.valid_from {
            return Err(ReconcileError::AsOfBeforeCurrentVersion {
                identifier: id.clone(),
                valid_from: existing.valid_from,
                as_of: opts.as_of,
            });
        }

        existing.close(opts.as_of);
        let closed_key = existing.technical_key.clone();
        let new_key = keys.next_key(id, opts.as_of);
        opened.push((
            id.clone(),
            HistorizedRow::open(new_key.clone(), opts.as_of, row.attributes.clone()),
        ));
        report.entities.push(EntityOutcome {
            identifier: id.clone(),
            action: EntityAction::Changed {
                closed_key,
                new_key,
                changes,
            },
        });
    }

    // 4) absentees are reported, never closed
    let in_snapshot: BTreeSet<&str> = snapshot_ids.iter().map(String::as_str).collect();
    report.untouched = current
        .keys()
        .filter(|id| !in_snapshot.contains(id.as_str()))
        .cloned()
        .collect();

    // 5) stable output order: identifier, valid_from, closed before current.
    // Ties keep history order first, then snapshot order.
    let mut keyed: Vec<(String, HistorizedRow)> = history_ids.into_iter().zip(history).collect();
    keyed.extend(opened);
    keyed.sort_by(|(a_id, a), (b_id, b)| {
        a_id.cmp(b_id)
            .then(a.valid_from.cmp(&b.valid_from))
            .then(a.is_current.cmp(&b.is_current))
    });

    Ok(ReconcileOutcome {
        rows: keyed.into_iter().map(|(_, row)| row).collect(),
        report,
    })
}

fn require_id(
    value: Option<&crate::Value>,
    origin: RowOrigin,
    index: usize,
    id_field: &str,
) -> Result<String, ReconcileError> {
    value
        .and_then(identifier_key)
        .ok_or_else(|| ReconcileError::MissingIdentifier {
            origin,
            index,
            id_field: id_field.to_string(),
        })
}

fn index_current(
    history: &[HistorizedRow],
    history_ids: &[String],
) -> Result<BTreeMap<String, usize>, ReconcileError> {
    let mut currents: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, (row, id)) in history.iter().zip(history_ids).enumerate() {
        if row.is_current {
            currents.entry(id.as_str()).or_default().push(i);
        }
    }

    let mut out = BTreeMap::new();
    for (id, idxs) in currents {
        if idxs.len() > 1 {
            return Err(ReconcileError::CorruptHistory {
                identifier: id.to_string(),
                current_keys: idxs
                    .iter()
                    .map(|&i| history[i].technical_key.clone())
                    .collect(),
            });
        }
        out.insert(id.to_string(), idxs[0]);
    }
    Ok(out)
}

fn check_schema(snapshot: &[EntityRow], history: &[HistorizedRow]) -> Result<(), ReconcileError> {
    let snapshot_names = uniform_names(
        snapshot.iter().map(EntityRow::attribute_names),
        RowOrigin::Snapshot,
    )?;
    let history_names = uniform_names(
        history.iter().map(HistorizedRow::attribute_names),
        RowOrigin::History,
    )?;

    if let (Some(s), Some(h)) = (snapshot_names, history_names) {
        if s != h {
            return Err(ReconcileError::SchemaMismatch(SchemaMismatch::SnapshotVsHistory {
                missing_in_snapshot: h.difference(&s).map(|n| n.to_string()).collect(),
                missing_in_history: s.difference(&h).map(|n| n.to_string()).collect(),
            }));
        }
    }
    Ok(())
}

/// Attribute set shared by every row, or `None` for an empty input.
fn uniform_names<'a>(
    mut rows: impl Iterator<Item = BTreeSet<&'a str>>,
    origin: RowOrigin,
) -> Result<Option<BTreeSet<&'a str>>, ReconcileError> {
    let Some(expected) = rows.next() else {
        return Ok(None);
    };
    for (i, found) in rows.enumerate() {
        if found != expected {
            return Err(ReconcileError::SchemaMismatch(SchemaMismatch::InconsistentRow {
                origin,
                index: i + 1,
                expected: expected.iter().map(|n| n.to_string()).collect(),
                found: found.iter().map(|n| n.to_string()).collect(),
            }));
        }
    }
    Ok(Some(expected))
}

/// Attributes whose values are not equivalent, in attribute-name order.
/// Both maps are known to share the same key set.
fn diff_attributes(
    previous: &Attributes,
    current: &Attributes,
    comparator: &dyn ValueComparator,
) -> Vec<FieldChange> {
    previous
        .iter()
        .filter_map(|(field, prev)| {
            let cur = current.get(field)?;
            if comparator.equivalent(prev, cur) {
                None
            } else {
                Some(FieldChange {
                    field: field.clone(),
                    previous: prev.clone(),
                    current: cur.clone(),
                })
            }
        })
        .collect()
}
