use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use phonehome_calls::{
    CallStore, CountResult, FilterQuery, IngestService, QueryService, SqliteCallStore,
};
use phonehome_db::{open, DbPool, DbSettings};

fn open_file(path: &str) -> DbPool {
    open(&DbSettings::file(path)).expect("failed to open database")
}

#[test]
fn concurrent_registrations_are_all_counted() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = dir.path().join("calls.db");
    let pool = open_file(db_path.to_str().expect("utf-8 path"));

    let store: Arc<dyn CallStore> = Arc::new(SqliteCallStore::new(pool));
    let ingest = IngestService::new(store.clone());
    let query = QueryService::new(store);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let ingest = ingest.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let body = format!(r#"{{"worker":{worker},"seq":{i}}}"#);
                    ingest
                        .register("acme", "widget", "", body.as_bytes())
                        .expect("registration should succeed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let total = query
        .count_calls(&FilterQuery::scoped("acme", "widget"))
        .expect("count should succeed");
    assert_eq!(total, 200);

    let listed = query
        .list_calls(&FilterQuery::scoped("acme", "widget").with_key("seq"))
        .expect("list should succeed");
    assert_eq!(listed.len(), 200);
}

#[test]
fn calls_survive_reopening_the_database() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = dir.path().join("calls.db");
    let db_path = db_path.to_str().expect("utf-8 path");

    {
        let store: Arc<dyn CallStore> = Arc::new(SqliteCallStore::new(open_file(db_path)));
        let ingest = IngestService::new(store);
        ingest
            .register("acme", "widget", "", br#"{"os":"linux","nested":{"x":1}}"#)
            .expect("registration should succeed");
    }

    let store: Arc<dyn CallStore> = Arc::new(SqliteCallStore::new(open_file(db_path)));
    let query = QueryService::new(store);

    let calls = query
        .list_calls(&FilterQuery::scoped("acme", "widget"))
        .expect("list should succeed");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].payload.contains_key("os"));
    assert!(!calls[0].payload.contains_key("nested"));

    let today = calls[0].timestamp.date_naive();
    let filter = FilterQuery {
        group_by: "day".to_string(),
        ..FilterQuery::scoped("acme", "widget").since(today)
    };
    match query.count(&filter).expect("count should succeed") {
        CountResult::Daily(days) => {
            assert_eq!(days.len(), 1);
            assert_eq!(days[0].date, today);
            assert_eq!(days[0].count, 1);
        }
        other => panic!("expected daily counts, got {other:?}"),
    }

    let far_future = NaiveDate::from_ymd_opt(2999, 1, 1).expect("valid date");
    let none = query
        .count_calls(&FilterQuery::scoped("acme", "widget").since(far_future))
        .expect("count should succeed");
    assert_eq!(none, 0);
}
