//! Read-only inspection of a historized table.
//!
//! [`verify_history`] checks the single-current-version and interval-coverage
//! invariants across a whole table without modifying it. [`rows_as_of`] is the
//! point-in-time view.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::compare::identifier_key;
use crate::{open_sentinel, HistorizedRow};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HistoryViolation {
    MissingIdentifier {
        index: usize,
    },
    DuplicateTechnicalKey {
        technical_key: String,
    },
    NoCurrentVersion {
        identifier: String,
    },
    MultipleCurrentVersions {
        identifier: String,
        technical_keys: Vec<String>,
    },
    InvertedInterval {
        identifier: String,
        technical_key: String,
        valid_from: NaiveDate,
        valid_to: NaiveDate,
    },
    /// `is_current` is set but `valid_to` is not the open sentinel.
    CurrentVersionClosed {
        identifier: String,
        technical_key: String,
    },
    /// `valid_to` is the open sentinel but `is_current` is not set.
    OpenVersionNotCurrent {
        identifier: String,
        technical_key: String,
    },
    Gap {
        identifier: String,
        after_key: String,
        before_key: String,
        from: NaiveDate,
        to: NaiveDate,
    },
    Overlap {
        identifier: String,
        first_key: String,
        second_key: String,
    },
}

/// Result of [`verify_history`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryAudit {
    pub rows: usize,
    pub identifiers: usize,
    /// Sorted, so two audits of the same table compare equal.
    pub violations: Vec<HistoryViolation>,
}

impl HistoryAudit {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every identifier's versions for a single current row and gap-free,
/// non-overlapping intervals ending at the open sentinel.
pub fn verify_history(rows: &[HistorizedRow], id_field: &str) -> HistoryAudit {
    let mut violations = Vec::new();
    let sentinel = open_sentinel();

    let mut seen_keys: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *seen_keys.entry(row.technical_key.as_str()).or_default() += 1;
    }
    for (key, n) in &seen_keys {
        if *n > 1 {
            violations.push(HistoryViolation::DuplicateTechnicalKey {
                technical_key: key.to_string(),
            });
        }
    }

    let mut by_id: BTreeMap<String, Vec<&HistorizedRow>> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        match row.get(id_field).and_then(identifier_key) {
            Some(id) => by_id.entry(id).or_default().push(row),
            None => violations.push(HistoryViolation::MissingIdentifier { index }),
        }
    }

    for (id, versions) in by_id.iter_mut() {
        versions.sort_by(|a, b| {
            a.valid_from
                .cmp(&b.valid_from)
                .then(a.is_current.cmp(&b.is_current))
                .then(a.valid_to.cmp(&b.valid_to))
        });

        let current: Vec<String> = versions
            .iter()
            .filter(|r| r.is_current)
            .map(|r| r.technical_key.clone())
            .collect();
        match current.len() {
            0 => violations.push(HistoryViolation::NoCurrentVersion {
                identifier: id.clone(),
            }),
            1 => {}
            _ => violations.push(HistoryViolation::MultipleCurrentVersions {
                identifier: id.clone(),
                technical_keys: current,
            }),
        }

        for r in versions.iter() {
            if r.valid_to < r.valid_from {
                violations.push(HistoryViolation::InvertedInterval {
                    identifier: id.clone(),
                    technical_key: r.technical_key.clone(),
                    valid_from: r.valid_from,
                    valid_to: r.valid_to,
                });
            }
            if r.is_current && r.valid_to != sentinel {
                violations.push(HistoryViolation::CurrentVersionClosed {
                    identifier: id.clone(),
                    technical_key: r.technical_key.clone(),
                });
            }
            if !r.is_current && r.valid_to == sentinel {
                violations.push(HistoryViolation::OpenVersionNotCurrent {
                    identifier: id.clone(),
                    technical_key: r.technical_key.clone(),
                });
            }
        }

        for pair in versions.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.valid_to < b.valid_from {
                violations.push(HistoryViolation::Gap {
                    identifier: id.clone(),
                    after_key: a.technical_key.clone(),
                    before_key: b.technical_key.clone(),
                    from: a.valid_to,
                    to: b.valid_from,
                });
            } else if a.valid_to > b.valid_from {
                violations.push(HistoryViolation::Overlap {
                    identifier: id.clone(),
                    first_key: a.technical_key.clone(),
                    second_key: b.technical_key.clone(),
                });
            }
        }
    }

    violations.sort();
    HistoryAudit {
        rows: rows.len(),
        identifiers: by_id.len(),
        violations,
    }
}

/// Versions in effect on `date`, in table order.
///
/// Zero-length versions (closed on the day they opened) are never in effect.
pub fn rows_as_of(rows: &[HistorizedRow], date: NaiveDate) -> Vec<&HistorizedRow> {
    rows.iter().filter(|r| r.is_valid_on(date)).collect()
}
