use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::csv_format::{decode_history, decode_snapshot, encode_history};
use crate::{
    HistoryReader, HistoryTable, HistoryVersion, HistoryWriter, LoadedHistory, SnapshotReader,
    SnapshotTable, StoreError,
};

/// A directory of `<table>.csv` files.
#[derive(Clone, Debug)]
pub struct CsvDataset {
    root: PathBuf,
}

impl CsvDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.csv"))
    }

    pub fn snapshot_table(&self, table: &str) -> CsvSnapshotTable {
        CsvSnapshotTable {
            path: self.table_path(table),
        }
    }

    pub fn history_table(&self, table: &str) -> CsvHistoryTable {
        CsvHistoryTable {
            path: self.table_path(table),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsvSnapshotTable {
    path: PathBuf,
}

impl CsvSnapshotTable {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotReader for CsvSnapshotTable {
    fn read_snapshot(&self) -> Result<SnapshotTable, StoreError> {
        let label = self.path.display().to_string();
        let bytes = fs::read(&self.path).map_err(|e| io_err(&label, e))?;
        let table = decode_snapshot(bytes.as_slice(), &label)?;
        debug!(path = %label, rows = table.rows.len(), "snapshot read");
        Ok(table)
    }
}

/// History table stored as one CSV file.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so readers see either the old or the new table. Writers take an
/// exclusive lock on a sidecar `<table>.csv.lock` file, then fingerprint the
/// current file and compare it with the version returned by the read; a
/// mismatch means another run replaced the table in between and the write is
/// refused. The lock is held until the rename is done, so of several runs
/// that read the same version only one can replace the table.
#[derive(Clone, Debug)]
pub struct CsvHistoryTable {
    path: PathBuf,
}

impl CsvHistoryTable {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Raw bytes, or `None` when the file does not exist.
    fn read_bytes(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(&self.path) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&self.label(), e)),
        }
    }
}

impl HistoryReader for CsvHistoryTable {
    fn read_history(&self) -> Result<LoadedHistory, StoreError> {
        let label = self.label();
        let Some(bytes) = self.read_bytes()? else {
            debug!(path = %label, "history table absent");
            return Ok(LoadedHistory {
                table: None,
                version: HistoryVersion::absent(),
            });
        };

        let table = decode_history(bytes.as_slice(), &label)?;
        debug!(path = %label, rows = table.rows.len(), "history read");
        Ok(LoadedHistory {
            table: Some(table),
            version: HistoryVersion(Some(fingerprint(&bytes))),
        })
    }
}

impl HistoryWriter for CsvHistoryTable {
    fn replace_history(&self, table: &HistoryTable, expected: &HistoryVersion) -> Result<(), StoreError> {
        let label = self.label();
        let encoded = encode_history(table, &label)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io_err(&label, e))?;

        let _lock = WriteLock::acquire(&self.lock_path()).map_err(|e| io_err(&label, e))?;

        let found = self.read_bytes()?.map(|b| fingerprint(&b));
        if found.as_deref() != expected.as_deref() {
            return Err(StoreError::ConcurrentModification {
                path: label,
                expected: expected.0.clone(),
                found,
            });
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".scdk-")
            .suffix(".csv.tmp")
            .tempfile_in(&dir)
            .map_err(|e| io_err(&label, e))?;
        tmp.write_all(&encoded).map_err(|e| io_err(&label, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(&label, e))?;

        let persisted = match expected.as_deref() {
            None => tmp.persist_noclobber(&self.path),
            Some(_) => tmp.persist(&self.path),
        };
        match persisted {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                // created by a writer that does not take the lock
                return Err(StoreError::ConcurrentModification {
                    path: label,
                    expected: None,
                    found: self.read_bytes()?.map(|b| fingerprint(&b)),
                });
            }
            Err(e) => return Err(io_err(&label, e.error)),
        }

        debug!(path = %label, rows = table.rows.len(), bytes = encoded.len(), "history replaced");
        Ok(())
    }
}

/// Exclusive advisory lock on a sidecar file, released on drop.
/// The sidecar itself stays on disk.
struct WriteLock {
    file: File,
}

impl WriteLock {
    fn acquire(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn io_err(path: &str, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}
