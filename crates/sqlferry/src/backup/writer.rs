//! Concurrent write coordination for row sets.
//!
//! Multiple workers write disjoint row slices of the same logical row set
//! concurrently. [`WriteRowSetManager`] is the only point where their
//! state meets: a start map guaranteeing the column manifest is set
//! exactly once, per-row-set aggregation of chunk counts, and a
//! split-index-ordered assembly of the final chunk list. [`WorkManager`]
//! tracks failures job-wide; `can_write` turning false is the cooperative
//! stop signal every worker polls before each chunk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::{CatalogColumn, CatalogEntry, Chunk, RowSet};

/// One recorded failure, with the entry it happened in.
#[derive(Debug, Clone)]
pub struct WorkFailure {
    pub entry: String,
    pub error: String,
}

/// Job-wide failure tracking shared by all workers of one dump.
///
/// Torn down with the job; never process-global.
#[derive(Debug, Default)]
pub struct WorkManager {
    failures: Mutex<Vec<WorkFailure>>,
}

impl WorkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, making `can_write` false for everyone.
    pub fn failure(&self, entry: impl Into<String>, error: impl Into<String>) {
        let failure = WorkFailure {
            entry: entry.into(),
            error: error.into(),
        };
        warn!("Recorded failure for {}: {}", failure.entry, failure.error);
        self.failures.lock().expect("failures lock").push(failure);
    }

    /// True once any failure has been recorded anywhere in the job.
    pub fn has_failures(&self) -> bool {
        !self.failures.lock().expect("failures lock").is_empty()
    }

    /// Snapshot of recorded failures, in recording order.
    pub fn failures(&self) -> Vec<WorkFailure> {
        self.failures.lock().expect("failures lock").clone()
    }
}

/// Coordinates concurrent chunk writers for row sets.
pub struct WriteRowSetManager {
    work: Arc<WorkManager>,
    /// Row sets whose column manifest has been set.
    started: Mutex<HashSet<CatalogEntry>>,
    /// Completed chunk lists per row set, keyed by worker split index.
    works: Mutex<HashMap<CatalogEntry, BTreeMap<usize, Vec<Chunk>>>>,
}

impl WriteRowSetManager {
    pub fn new(work: Arc<WorkManager>) -> Self {
        Self {
            work,
            started: Mutex::new(HashSet::new()),
            works: Mutex::new(HashMap::new()),
        }
    }

    /// The failure tracker this manager reports into.
    pub fn work_manager(&self) -> &Arc<WorkManager> {
        &self.work
    }

    /// First caller for a row set sets its column manifest; later callers
    /// are no-ops. The check-and-set is atomic under the start-map lock,
    /// so two workers racing to be "first" cannot double-initialize or
    /// leave the columns unset.
    pub fn write_start(&self, row_set: &RowSet, columns: &[CatalogColumn]) {
        let mut started = self.started.lock().expect("start map lock");
        if started.insert(row_set.entry().clone()) {
            row_set.set_columns(columns.to_vec());
        }
    }

    /// Cooperative cancellation check, polled before each chunk write.
    /// False once any failure has been recorded anywhere in the job.
    pub fn can_write(&self) -> bool {
        !self.work.has_failures()
    }

    /// Count one row into a worker-owned chunk. Chunk-local, no lock:
    /// no two workers ever share a chunk.
    pub fn write_row(&self, chunk: &mut Chunk) {
        chunk.row_count += 1;
    }

    /// A worker finished one chunk: fold its rows into the row set total
    /// under the row set's own lock.
    pub fn write_end_chunk(&self, row_set: &RowSet, chunk: &Chunk) {
        row_set.add_rows(chunk.row_count);
    }

    /// A worker completed: register its chunk list and reassemble the row
    /// set's full chunk list, ordered by split index regardless of which
    /// worker finished first.
    pub fn write_end(&self, row_set: &RowSet, split_index: usize, chunks: Vec<Chunk>) {
        let mut works = self.works.lock().expect("works lock");
        let per_split = works.entry(row_set.entry().clone()).or_default();
        per_split.insert(split_index, chunks);

        let mut assembled: Vec<Chunk> = per_split.values().flatten().cloned().collect();
        assembled.sort_by_key(Chunk::order_key);
        row_set.set_chunks(assembled);
    }
}

impl std::fmt::Debug for WriteRowSetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRowSetManager")
            .field("failures", &self.work.failures().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> CatalogColumn {
        CatalogColumn {
            name: name.into(),
            type_alias: "integer".into(),
        }
    }

    #[test]
    fn test_write_start_sets_columns_once() {
        let manager = WriteRowSetManager::new(Arc::new(WorkManager::new()));
        let row_set = RowSet::new(CatalogEntry::new("users", "csv"));

        manager.write_start(&row_set, &[column("id"), column("age")]);
        manager.write_start(&row_set, &[column("other")]);

        let columns = row_set.columns();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
    }

    #[test]
    fn test_can_write_flips_on_failure() {
        let work = Arc::new(WorkManager::new());
        let manager = WriteRowSetManager::new(work.clone());
        assert!(manager.can_write());

        work.failure("users", "conversion failed");
        assert!(!manager.can_write());
        assert_eq!(work.failures()[0].entry, "users");
    }

    #[test]
    fn test_chunk_assembly_ignores_completion_order() {
        let manager = WriteRowSetManager::new(Arc::new(WorkManager::new()));
        let row_set = RowSet::new(CatalogEntry::new("users", "csv"));

        // Worker 2 finishes before worker 0.
        manager.write_end(&row_set, 2, vec![Chunk::new(2, 0)]);
        manager.write_end(&row_set, 0, vec![Chunk::new(0, 0), Chunk::new(0, 1)]);
        manager.write_end(&row_set, 1, vec![Chunk::new(1, 0)]);

        let order: Vec<(usize, usize)> = row_set.chunks().iter().map(Chunk::order_key).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (2, 0)]);
    }

    #[test]
    fn test_row_counts_fold_under_lock() {
        let manager = Arc::new(WriteRowSetManager::new(Arc::new(WorkManager::new())));
        let row_set = Arc::new(RowSet::new(CatalogEntry::new("users", "csv")));

        let mut handles = Vec::new();
        for split in 0..8 {
            let manager = manager.clone();
            let row_set = row_set.clone();
            handles.push(std::thread::spawn(move || {
                let mut chunk = Chunk::new(split, 0);
                for _ in 0..1_000 {
                    manager.write_row(&mut chunk);
                }
                manager.write_end_chunk(&row_set, &chunk);
                manager.write_end(&row_set, split, vec![chunk]);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(row_set.row_count(), 8_000);
        assert_eq!(row_set.chunks().len(), 8);
    }
}
