//! scdk-store
//!
//! Storage boundary for historization jobs. The reconcile engine never touches
//! storage; callers read a snapshot and the existing history through the
//! traits here, reconcile in memory, and hand the complete replacement table
//! back to a [`HistoryWriter`].
//!
//! Implementations:
//! - [`CsvDataset`]: one CSV file per table in a dataset directory, replaced
//!   atomically (temp file + rename) with an optimistic fingerprint check.
//! - [`MemoryStore`]: in-process tables for tests and dry runs.

mod csv_format;
mod file_store;
mod memory;

pub use csv_format::{
    decode_history, decode_snapshot, encode_history, DATE_FORMAT, META_COLUMNS, NO, YES,
    COL_DATE_FROM, COL_DATE_TO, COL_IS_VALID, COL_TECHNICAL_KEY,
};
pub use file_store::{CsvDataset, CsvHistoryTable, CsvSnapshotTable};
pub use memory::MemoryStore;

use scdk_reconcile::{EntityRow, HistorizedRow};

/// Current contents of the source table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotTable {
    /// Attribute columns in source order.
    pub columns: Vec<String>,
    pub rows: Vec<EntityRow>,
}

/// Contents of the historized table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryTable {
    /// Attribute columns in stored order (versioning columns excluded).
    pub attribute_columns: Vec<String>,
    pub rows: Vec<HistorizedRow>,
}

/// Opaque marker of the history table state that was read.
///
/// `None` means the table did not exist. A writer compares this with the
/// table's state at write time and refuses to replace a table that moved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryVersion(pub Option<String>);

impl HistoryVersion {
    pub fn absent() -> Self {
        Self(None)
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// What a [`HistoryReader`] returns.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedHistory {
    /// `None` when the destination table does not exist yet (first run).
    pub table: Option<HistoryTable>,
    pub version: HistoryVersion,
}

pub trait SnapshotReader {
    fn read_snapshot(&self) -> Result<SnapshotTable, StoreError>;
}

pub trait HistoryReader {
    fn read_history(&self) -> Result<LoadedHistory, StoreError>;
}

pub trait HistoryWriter {
    /// Replace the whole table with `table`, provided it is still at `expected`.
    fn replace_history(&self, table: &HistoryTable, expected: &HistoryVersion) -> Result<(), StoreError>;
}

/// All errors that can occur at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Filesystem failure.
    Io { path: String, message: String },
    /// Malformed CSV (ragged rows, bad UTF-8, ...).
    Csv { path: String, message: String },
    /// A required column is missing from the header, or a row lacks an attribute.
    MissingColumn { path: String, column: String },
    /// A header lists the same column twice.
    DuplicateColumn { path: String, column: String },
    /// A snapshot column collides with a versioning column name.
    ReservedColumn { path: String, column: String },
    /// A versioning field could not be parsed.
    ParseField {
        path: String,
        row: usize,
        column: String,
        raw: String,
    },
    /// The table changed between read and write.
    ConcurrentModification {
        path: String,
        expected: Option<String>,
        found: Option<String>,
    },
}

impl StoreError {
    /// `true` for failures a whole-operation retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Io { .. } | StoreError::ConcurrentModification { .. }
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io { path, message } => write!(f, "io error on '{path}': {message}"),
            StoreError::Csv { path, message } => write!(f, "csv error in '{path}': {message}"),
            StoreError::MissingColumn { path, column } => {
                write!(f, "'{path}' is missing required column '{column}'")
            }
            StoreError::DuplicateColumn { path, column } => {
                write!(f, "'{path}' lists column '{column}' more than once")
            }
            StoreError::ReservedColumn { path, column } => {
                write!(f, "'{path}' uses reserved versioning column name '{column}'")
            }
            StoreError::ParseField {
                path,
                row,
                column,
                raw,
            } => write!(
                f,
                "'{path}' row {row}: cannot parse column '{column}' from value '{raw}'"
            ),
            StoreError::ConcurrentModification {
                path,
                expected,
                found,
            } => write!(
                f,
                "'{path}' changed since it was read (expected {}, found {}); refusing to replace",
                expected.as_deref().unwrap_or("<absent>"),
                found.as_deref().unwrap_or("<absent>")
            ),
        }
    }
}

impl std::error::Error for StoreError {}
