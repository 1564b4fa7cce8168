//! End-to-end dump and load against in-memory sessions.

use std::sync::Arc;

use sqlferry::{
    Catalog, Column, ColumnMeta, Database, DatabaseInfo, DialectResolver, DumpJob, DumpSpec,
    FormatFactory, JobControl, JobSettings, JobStatus, LoadJob, LoadSpec, MemorySession,
    SqlTypeCode, StaticInspector, Table, TableSpec, Value,
};

fn users_database(rows: u64) -> Database {
    let table = Table::new("users")
        .with_column(Column::new("id", SqlTypeCode::Integer).not_null())
        .with_column(Column::new("name", SqlTypeCode::Varchar).with_size(100))
        .with_column(Column::new("data", SqlTypeCode::Blob))
        .with_row_count(rows);
    Database::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0), vec![table])
}

fn users_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("id", "int"),
        ColumnMeta::new("name", "varchar"),
        ColumnMeta::new("data", "longblob"),
    ]
}

fn users_rows(count: i32) -> Vec<Vec<Value>> {
    (0..count)
        .map(|i| {
            let data = if i % 10 == 0 {
                Value::Null
            } else {
                Value::Bytes(vec![i as u8, 0, 255, 0])
            };
            let name = match i % 7 {
                0 => Value::Text(String::new()),
                1 => Value::Text(format!("üser-{}", i)),
                _ => Value::Text(format!("user-{}", i)),
            };
            vec![Value::I32(i), name, data]
        })
        .collect()
}

fn dump_job(dir: &std::path::Path, session: Arc<MemorySession>, spec: DumpSpec) -> DumpJob {
    DumpJob::new(
        Arc::new(DialectResolver::with_builtins()),
        Arc::new(StaticInspector::new(users_database(100))),
        session,
        Arc::new(FormatFactory::with_builtins()),
        Catalog::new(dir),
        spec,
    )
}

/// 100 rows, 4 workers of 25 rows each: one entry, rowCount=100, four
/// chunks with split indexes 0..3 of 25 rows each, and the manifest's
/// column list holding exactly the three columns in source order.
#[tokio::test]
async fn four_way_split_produces_ordered_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let session = Arc::new(
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0)).with_table(
            "users",
            users_columns(),
            users_rows(100),
        ),
    );

    let job = dump_job(tmp.path(), session.clone(), DumpSpec::default()).with_settings(
        JobSettings {
            workers: Some(4),
            ..Default::default()
        },
    );
    let report = job.execute(JobControl::new().watch()).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.rows_total, 100);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].chunk_count, 4);

    let reader = Catalog::new(tmp.path()).reader().unwrap();
    let entry = &reader.entries()[0];
    assert_eq!(entry.name, "users");
    assert_eq!(entry.row_count, 100);

    let aliases: Vec<(&str, &str)> = entry
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.type_alias.as_str()))
        .collect();
    assert_eq!(
        aliases,
        vec![("id", "integer"), ("name", "varchar"), ("data", "blob")]
    );

    let splits: Vec<usize> = entry.chunks.iter().map(|c| c.split_index).collect();
    assert_eq!(splits, vec![0, 1, 2, 3]);
    assert!(entry.chunks.iter().all(|c| c.row_count == 25));

    // The dump negotiated isolation before streaming.
    assert!(session
        .executed()
        .iter()
        .any(|sql| sql.contains("REPEATABLE READ")));
}

#[tokio::test]
async fn dump_then_load_round_trips_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let source = Arc::new(
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0)).with_table(
            "users",
            users_columns(),
            users_rows(100),
        ),
    );

    let job = dump_job(tmp.path(), source, DumpSpec::default()).with_settings(JobSettings {
        workers: Some(4),
        ..Default::default()
    });
    job.execute(JobControl::new().watch()).await.unwrap();

    let target = Arc::new(MemorySession::new(DatabaseInfo::new("NuoDB")));
    let load = LoadJob::new(
        Arc::new(DialectResolver::with_builtins()),
        target.clone(),
        Arc::new(FormatFactory::with_builtins()),
        Catalog::new(tmp.path()),
        LoadSpec {
            schema: Some("app".into()),
            ..Default::default()
        },
    );
    let report = load.execute(JobControl::new().watch()).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.rows_total, 100);
    assert_eq!(target.inserted_rows(), 100);

    let inserted = target.inserted();
    let (sql, rows) = inserted.iter().next().unwrap();
    assert!(sql.starts_with("INSERT INTO \"app\".\"users\""));

    // Values came back through the registry with their logical types.
    let sample = rows
        .iter()
        .find(|r| r[0] == Value::I32(1))
        .expect("row with id 1");
    assert_eq!(sample[1], Value::Text("üser-1".into()));
    assert_eq!(sample[2], Value::Bytes(vec![1, 0, 255, 0]));

    let with_null = rows
        .iter()
        .find(|r| r[0] == Value::I32(10))
        .expect("row with id 10");
    assert_eq!(with_null[2], Value::Null);
}

#[tokio::test]
async fn session_time_zone_set_and_restored() {
    let tmp = tempfile::tempdir().unwrap();
    let session = Arc::new(
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0)).with_table(
            "users",
            users_columns(),
            users_rows(10),
        ),
    );

    let spec = DumpSpec {
        time_zone: Some("+02:00".into()),
        ..Default::default()
    };
    dump_job(tmp.path(), session.clone(), spec)
        .execute(JobControl::new().watch())
        .await
        .unwrap();

    let executed = session.executed();
    let set_pos = executed
        .iter()
        .position(|sql| sql == "SET @@session.time_zone = '+02:00'")
        .expect("session time zone set");
    let reset_pos = executed
        .iter()
        .position(|sql| sql == "SET @@session.time_zone = 'SYSTEM'")
        .expect("session time zone restored");
    assert!(set_pos < reset_pos);
}

#[tokio::test]
async fn isolation_falls_back_when_level_unsupported() {
    let tmp = tempfile::tempdir().unwrap();
    let session = Arc::new(
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0))
            .with_table("users", users_columns(), users_rows(10))
            .rejecting("REPEATABLE READ"),
    );

    let report = dump_job(tmp.path(), session.clone(), DumpSpec::default())
        .execute(JobControl::new().watch())
        .await
        .unwrap();
    assert_eq!(report.status, JobStatus::Completed);
    assert!(session
        .executed()
        .iter()
        .any(|sql| sql.contains("READ COMMITTED")));
}

/// A failing entry aborts the job after the current entry, but the report
/// still enumerates the entries that succeeded.
#[tokio::test]
async fn partial_failure_reported_per_entry() {
    let tmp = tempfile::tempdir().unwrap();

    let good = Table::new("aaa_good")
        .with_column(Column::new("id", SqlTypeCode::Integer))
        .with_row_count(5);
    let bad = Table::new("zzz_bad")
        .with_column(Column::new("id", SqlTypeCode::Integer))
        .with_row_count(5);
    let database = Database::new(
        DatabaseInfo::new("MySQL").with_major_minor(8, 0),
        vec![good, bad],
    );

    let session = Arc::new(
        MemorySession::new(database.info().clone())
            .with_table(
                "aaa_good",
                vec![ColumnMeta::new("id", "int")],
                (0..5).map(|i| vec![Value::I32(i)]).collect(),
            )
            .with_table(
                "zzz_bad",
                // The engine reports a type the registry does not know.
                vec![ColumnMeta::new("id", "geometry_collection")],
                (0..5).map(|i| vec![Value::I32(i)]).collect(),
            ),
    );

    let job = DumpJob::new(
        Arc::new(DialectResolver::with_builtins()),
        Arc::new(StaticInspector::new(database)),
        session,
        Arc::new(FormatFactory::with_builtins()),
        Catalog::new(tmp.path()),
        DumpSpec {
            tables: vec![TableSpec::named("aaa_good"), TableSpec::named("zzz_bad")],
            ..Default::default()
        },
    );
    let report = job.execute(JobControl::new().watch()).await.unwrap();

    assert_eq!(report.status, JobStatus::PartiallyFailed);
    assert_eq!(report.entries.len(), 2);
    assert!(report.entries[0].succeeded());
    assert_eq!(report.entries[0].row_count, 5);
    assert!(!report.entries[1].succeeded());
    assert!(report.entries[1]
        .error
        .as_deref()
        .unwrap()
        .contains("geometry_collection"));

    // The failed entry is still named in the manifest for diagnosis.
    let reader = Catalog::new(tmp.path()).reader().unwrap();
    assert_eq!(reader.entries().len(), 2);
    assert_eq!(reader.entries()[1].name, "zzz_bad");
    assert_eq!(reader.entries()[1].row_count, 0);
}

#[tokio::test]
async fn cancellation_stops_within_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let session = Arc::new(
        MemorySession::new(DatabaseInfo::new("MySQL").with_major_minor(8, 0))
            .with_table("users", users_columns(), users_rows(100))
            .with_row_delay(std::time::Duration::from_millis(5)),
    );

    let control = JobControl::new();
    let cancel = control.watch();
    let job = dump_job(tmp.path(), session, DumpSpec::default()).with_settings(JobSettings {
        workers: Some(2),
        ..Default::default()
    });

    let handle = tokio::spawn(async move { job.execute(cancel).await });
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    control.cancel();
    assert!(!control.is_running());

    let report = handle.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_ne!(report.status, JobStatus::Completed);
    // Cancellation took effect before the table was exhausted.
    assert!(report.rows_total < 100);
}
