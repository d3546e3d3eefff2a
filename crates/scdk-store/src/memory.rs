use std::sync::{Mutex, MutexGuard};

use crate::{
    HistoryReader, HistoryTable, HistoryVersion, HistoryWriter, LoadedHistory, SnapshotReader,
    SnapshotTable, StoreError,
};

#[derive(Debug, Default)]
struct State {
    snapshot: SnapshotTable,
    history: Option<HistoryTable>,
    /// Bumped on every successful replace.
    generation: u64,
    /// Number of upcoming reads/writes that fail with `Io`.
    failing_reads: u32,
    failing_writes: u32,
    snapshot_reads: u32,
    writes: u32,
}

/// In-process source + history tables.
///
/// Implements all three storage traits, with injectable transient failures so
/// retry behaviour can be exercised without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(snapshot: SnapshotTable) -> Self {
        Self {
            state: Mutex::new(State {
                snapshot,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_snapshot(&self, snapshot: SnapshotTable) {
        self.lock().snapshot = snapshot;
    }

    /// Replace history out-of-band (simulates a concurrent writer).
    pub fn set_history(&self, history: Option<HistoryTable>) {
        let mut st = self.lock();
        st.history = history;
        st.generation += 1;
    }

    pub fn history(&self) -> Option<HistoryTable> {
        self.lock().history.clone()
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.lock().failing_reads = n;
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.lock().failing_writes = n;
    }

    /// Snapshot read attempts so far, failed ones included.
    pub fn snapshot_read_count(&self) -> u32 {
        self.lock().snapshot_reads
    }

    /// Successful replaces so far.
    pub fn write_count(&self) -> u32 {
        self.lock().writes
    }
}

fn version_of(st: &State) -> HistoryVersion {
    match st.history {
        Some(_) => HistoryVersion(Some(format!("mem-{}", st.generation))),
        None => HistoryVersion::absent(),
    }
}

impl SnapshotReader for MemoryStore {
    fn read_snapshot(&self) -> Result<SnapshotTable, StoreError> {
        let mut st = self.lock();
        st.snapshot_reads += 1;
        if st.failing_reads > 0 {
            st.failing_reads -= 1;
            return Err(StoreError::Io {
                path: "memory:snapshot".to_string(),
                message: "injected read failure".to_string(),
            });
        }
        Ok(st.snapshot.clone())
    }
}

impl HistoryReader for MemoryStore {
    fn read_history(&self) -> Result<LoadedHistory, StoreError> {
        let st = self.lock();
        Ok(LoadedHistory {
            table: st.history.clone(),
            version: version_of(&st),
        })
    }
}

impl HistoryWriter for MemoryStore {
    fn replace_history(&self, table: &HistoryTable, expected: &HistoryVersion) -> Result<(), StoreError> {
        let mut st = self.lock();
        if st.failing_writes > 0 {
            st.failing_writes -= 1;
            return Err(StoreError::Io {
                path: "memory:history".to_string(),
                message: "injected write failure".to_string(),
            });
        }

        let found = version_of(&st);
        if &found != expected {
            return Err(StoreError::ConcurrentModification {
                path: "memory:history".to_string(),
                expected: expected.0.clone(),
                found: found.0,
            });
        }

        st.history = Some(table.clone());
        st.generation += 1;
        st.writes += 1;
        Ok(())
    }
}
