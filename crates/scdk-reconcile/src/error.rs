use chrono::NaiveDate;

/// Which input a row came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOrigin {
    Snapshot,
    History,
}

impl RowOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowOrigin::Snapshot => "snapshot",
            RowOrigin::History => "history",
        }
    }
}

/// How the attribute sets disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaMismatch {
    /// Snapshot and history carry different attribute sets.
    SnapshotVsHistory {
        /// Present in history, absent from snapshot (sorted).
        missing_in_snapshot: Vec<String>,
        /// Present in snapshot, absent from history (sorted).
        missing_in_history: Vec<String>,
    },
    /// A row's attribute set differs from the first row of the same input.
    InconsistentRow {
        origin: RowOrigin,
        index: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// All errors the engine can return. Every one of them is fatal to the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    /// More than one current version for an identifier in the supplied history.
    CorruptHistory {
        identifier: String,
        current_keys: Vec<String>,
    },
    /// The snapshot lists the same identifier more than once.
    DuplicateIdentifier {
        identifier: String,
        first_index: usize,
        second_index: usize,
    },
    SchemaMismatch(SchemaMismatch),
    /// A row has no (or a blank) value for the identifier attribute.
    MissingIdentifier {
        origin: RowOrigin,
        index: usize,
        id_field: String,
    },
    /// Closing the current version at `as_of` would produce an inverted interval.
    AsOfBeforeCurrentVersion {
        identifier: String,
        valid_from: NaiveDate,
        as_of: NaiveDate,
    },
}

impl ReconcileError {
    /// Stable machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptHistory { .. } => "CORRUPT_HISTORY",
            Self::DuplicateIdentifier { .. } => "DUPLICATE_IDENTIFIER",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            Self::MissingIdentifier { .. } => "MISSING_IDENTIFIER",
            Self::AsOfBeforeCurrentVersion { .. } => "AS_OF_BEFORE_CURRENT_VERSION",
        }
    }
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptHistory {
                identifier,
                current_keys,
            } => write!(
                f,
                "corrupt history: identifier '{identifier}' has {} current versions ({})",
                current_keys.len(),
                current_keys.join(", ")
            ),
            Self::DuplicateIdentifier {
                identifier,
                first_index,
                second_index,
            } => write!(
                f,
                "duplicate identifier '{identifier}' in snapshot (rows {first_index} and {second_index})"
            ),
            Self::SchemaMismatch(SchemaMismatch::SnapshotVsHistory {
                missing_in_snapshot,
                missing_in_history,
            }) => write!(
                f,
                "schema mismatch: snapshot lacks {missing_in_snapshot:?}, history lacks {missing_in_history:?}"
            ),
            Self::SchemaMismatch(SchemaMismatch::InconsistentRow {
                origin,
                index,
                expected,
                found,
            }) => write!(
                f,
                "schema mismatch: {} row {index} has attributes {found:?}, expected {expected:?}",
                origin.as_str()
            ),
            Self::MissingIdentifier {
                origin,
                index,
                id_field,
            } => write!(
                f,
                "{} row {index} has no value for identifier attribute '{id_field}'",
                origin.as_str()
            ),
            Self::AsOfBeforeCurrentVersion {
                identifier,
                valid_from,
                as_of,
            } => write!(
                f,
                "as_of {as_of} is before current version of '{identifier}' (valid_from {valid_from}); \
                 out-of-order corrections are not supported"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {}
