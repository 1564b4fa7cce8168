//! Concurrency properties of the write coordination core.

use std::sync::Arc;
use std::time::Duration;

use sqlferry::backup::{CatalogEntry, Chunk, RowSet, WorkManager, WriteRowSetManager};
use sqlferry::{
    Catalog, Column, ColumnMeta, Database, DatabaseInfo, DialectResolver, DumpJob, DumpSpec,
    FormatFactory, JobControl, JobSettings, MemorySession, SqlTypeCode, StaticInspector, Table,
    Value,
};

/// Row-count exactness: totals are exact under arbitrary interleavings of
/// 8 workers with 10k rows each, spread over several chunks per worker.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn row_counts_exact_under_concurrency() {
    const WORKERS: usize = 8;
    const ROWS_PER_WORKER: u64 = 10_000;
    const CHUNK_ROWS: u64 = 3_000;

    let manager = Arc::new(WriteRowSetManager::new(Arc::new(WorkManager::new())));
    let row_set = Arc::new(RowSet::new(CatalogEntry::new("stress", "jsonl")));

    let mut handles = Vec::new();
    for split in 0..WORKERS {
        let manager = manager.clone();
        let row_set = row_set.clone();
        handles.push(tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut chunk = Chunk::new(split, 0);
            let mut seq = 0usize;
            for row in 0..ROWS_PER_WORKER {
                manager.write_row(&mut chunk);
                if chunk.row_count == CHUNK_ROWS {
                    manager.write_end_chunk(&row_set, &chunk);
                    chunks.push(chunk);
                    seq += 1;
                    chunk = Chunk::new(split, seq);
                }
                // Vary pacing so workers genuinely interleave.
                if row % 1_024 == split as u64 {
                    tokio::task::yield_now().await;
                }
            }
            if chunk.row_count > 0 {
                manager.write_end_chunk(&row_set, &chunk);
                chunks.push(chunk);
            }
            manager.write_end(&row_set, split, chunks);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(row_set.row_count(), WORKERS as u64 * ROWS_PER_WORKER);

    let chunks = row_set.chunks();
    assert_eq!(chunks.len(), WORKERS * 4); // 3000+3000+3000+1000 per worker
    assert_eq!(
        chunks.iter().map(|c| c.row_count).sum::<u64>(),
        WORKERS as u64 * ROWS_PER_WORKER
    );

    // Assembly order is (split, seq) regardless of completion order.
    let keys: Vec<(usize, usize)> = chunks.iter().map(Chunk::order_key).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
}

/// Chunk-ordering invariant: the same workload with and without
/// artificial per-row delays produces an identical final manifest.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn manifest_identical_under_randomized_delays() {
    async fn run(dir: &std::path::Path, delay: Option<Duration>) -> serde_json::Value {
        let table = Table::new("events")
            .with_column(Column::new("id", SqlTypeCode::Integer))
            .with_row_count(100);
        let database = Database::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0), vec![table]);

        let mut session = MemorySession::new(database.info().clone()).with_table(
            "events",
            vec![ColumnMeta::new("id", "int")],
            (0..100).map(|i| vec![Value::I32(i)]).collect(),
        );
        if let Some(delay) = delay {
            session = session.with_row_delay(delay);
        }

        let job = DumpJob::new(
            Arc::new(DialectResolver::with_builtins()),
            Arc::new(StaticInspector::new(database)),
            Arc::new(session),
            Arc::new(FormatFactory::with_builtins()),
            Catalog::new(dir),
            DumpSpec::default(),
        )
        .with_settings(JobSettings {
            workers: Some(4),
            chunk_rows: Some(10),
            ..Default::default()
        });
        job.execute(JobControl::new().watch()).await.unwrap();

        let reader = Catalog::new(dir).reader().unwrap();
        serde_json::to_value(reader.entries()).unwrap()
    }

    let fast_dir = tempfile::tempdir().unwrap();
    let slow_dir = tempfile::tempdir().unwrap();
    let fast = run(fast_dir.path(), None).await;
    let slow = run(slow_dir.path(), Some(Duration::from_millis(2))).await;

    assert_eq!(fast, slow);

    // 4 workers x 25 rows at 10 rows/chunk = 3 chunks per worker.
    let entries = fast.as_array().unwrap();
    let chunks = entries[0]["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 12);
}

/// Cooperative cancellation: once one worker records a failure, no worker
/// starts more than one additional chunk after the failure is visible.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_bounds_straggler_chunks() {
    const WORKERS: usize = 4;
    const MAX_CHUNKS: usize = 100;

    let work = Arc::new(WorkManager::new());
    let manager = Arc::new(WriteRowSetManager::new(work.clone()));
    let row_set = Arc::new(RowSet::new(CatalogEntry::new("doomed", "jsonl")));

    let mut handles = Vec::new();
    for split in 1..WORKERS {
        let manager = manager.clone();
        let row_set = row_set.clone();
        handles.push(tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut after_failure = 0usize;
            for seq in 0..MAX_CHUNKS {
                // canWrite is polled before every chunk.
                if !manager.can_write() {
                    break;
                }
                let mut chunk = Chunk::new(split, seq);
                for _ in 0..10 {
                    manager.write_row(&mut chunk);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                manager.write_end_chunk(&row_set, &chunk);
                chunks.push(chunk);
                if !manager.can_write() {
                    after_failure += 1;
                    break;
                }
            }
            manager.write_end(&row_set, split, chunks.clone());
            (chunks.len(), after_failure)
        }));
    }

    // Worker 0 fails shortly after the others start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    work.failure("doomed", "simulated conversion error");

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert!(work.has_failures());
    for (written, after_failure) in results {
        // Bounded straggler window: at most one chunk in flight when the
        // failure became visible, and far fewer than the full workload.
        assert!(after_failure <= 1);
        assert!(written < MAX_CHUNKS / 2, "worker wrote {} chunks", written);
    }
    assert_eq!(work.failures()[0].entry, "doomed");
}
