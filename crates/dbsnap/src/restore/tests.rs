use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use super::*;
use crate::backup::{BackupOptions, SnapshotBuilder};
use crate::snapshot::MemorySnapshot;
use crate::testing::{users_posts, MemoryConnector, RecordingObserver};

async fn backup_of(connector: &MemoryConnector) -> SnapshotDocument {
    SnapshotBuilder::new(Arc::new(connector.clone()))
        .with_options(BackupOptions {
            include_relationships: true,
            ..Default::default()
        })
        .build()
        .await
        .unwrap()
}

async fn snapshot_of(connector: &MemoryConnector) -> Arc<MemorySnapshot> {
    let doc = backup_of(connector).await;
    Arc::new(MemorySnapshot::with_bytes(doc.to_vec_pretty().unwrap()))
}

fn orchestrator(target: &MemoryConnector, source: Arc<MemorySnapshot>) -> RestoreOrchestrator {
    RestoreOrchestrator::new(Arc::new(target.clone()), source)
        .with_retry_policy(RetryPolicy::new(5, Duration::from_secs(5)))
}

fn document(value: serde_json::Value) -> Arc<MemorySnapshot> {
    Arc::new(MemorySnapshot::with_bytes(value.to_string()))
}

fn entries(journal: &[String], prefix: &str) -> Vec<String> {
    journal
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

#[test]
fn test_resolve_index_columns() {
    let columns = ["id", "user_id", "title"];
    assert_eq!(resolve_index_columns("ix_posts_user_id", &columns), vec!["user_id"]);
    assert_eq!(resolve_index_columns("ix_posts_title", &columns), vec!["title"]);
    assert_eq!(
        resolve_index_columns("ix_posts_user_id_title", &columns),
        vec!["user_id", "title"]
    );
    assert!(resolve_index_columns("ix_unrelated", &columns).is_empty());
}

#[test]
fn test_phase_display() {
    assert_eq!(RestorePhase::DisableConstraints.to_string(), "disable constraints");
    assert!(RestorePhase::ResolveOrder < RestorePhase::CreateTables);
}

#[tokio::test]
async fn test_restores_in_dependency_order() {
    let source = users_posts();
    let target = MemoryConnector::new();

    let report = orchestrator(&target, snapshot_of(&source).await)
        .run()
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.tables, vec!["users", "posts"]);
    assert_eq!(report.rows, 4);
    assert!(report.warnings.is_empty());
    assert!(Uuid::parse_str(&report.run_id).is_ok());

    assert_eq!(
        target.journal(),
        vec![
            "connect",
            "begin",
            "constraints:off",
            "create:users",
            "create:posts",
            "clear:users",
            "insert:users:2",
            "clear:posts",
            "insert:posts:2",
            "constraints:on",
            "commit",
            "close",
        ]
    );
    assert_eq!(target.rows("users"), source.rows("users"));
    assert_eq!(target.rows("posts"), source.rows("posts"));
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let source = users_posts();
    let snapshot = snapshot_of(&source).await;
    let target = MemoryConnector::new();

    orchestrator(&target, snapshot.clone()).run().await.unwrap();
    target.clear_journal();
    let report = orchestrator(&target, snapshot).run().await.unwrap();

    assert_eq!(report.rows, 4);
    assert!(entries(&target.journal(), "create:").is_empty());
    assert_eq!(target.rows("users").len(), 2);
    assert_eq!(target.rows("posts"), source.rows("posts"));
}

#[tokio::test]
async fn test_backup_of_restored_database_matches() {
    let source = users_posts();
    let original = backup_of(&source).await;
    let target = MemoryConnector::new();

    orchestrator(&target, snapshot_of(&source).await)
        .run()
        .await
        .unwrap();

    let copy = backup_of(&target).await;
    assert_eq!(copy.tables, original.tables);
    assert_eq!(copy.relationships, original.relationships);
}

#[tokio::test]
async fn test_single_column_unique_group_is_not_duplicated() {
    let source = users_posts();
    let doc = backup_of(&source).await;
    let orchestrator = orchestrator(&MemoryConnector::new(), snapshot_of(&source).await);

    let mut warnings = Vec::new();
    let def = orchestrator
        .define_table("users", &doc.tables["users"], &mut warnings)
        .unwrap();
    assert!(def.unique_constraints.is_empty());
    assert!(def.column("name").unwrap().unique);
    assert_eq!(def.primary_key, vec!["id"]);
    assert_eq!(def.indexes[0].columns, vec!["status"]);
}

#[tokio::test]
async fn test_primary_key_falls_back_to_column_flags() {
    let target = MemoryConnector::new();
    let source = document(json!({
        "version": "1.0",
        "tables": {"t": {
            "schema": {"columns": [
                {"name": "a", "type": {"type": "Integer"}, "primary_key": true, "nullable": false},
                {"name": "b", "type": {"type": "Integer"}, "primary_key": true, "nullable": false}
            ]},
            "data": []
        }}
    }));

    orchestrator(&target, source).run().await.unwrap();
    assert_eq!(target.table("t").unwrap().primary_key, vec!["a", "b"]);
}

#[tokio::test]
async fn test_cycle_fails_before_any_table_is_created() {
    let target = MemoryConnector::new();
    let column = |name: &str, refs: &str| {
        json!({"name": name, "type": {"type": "Integer"},
               "foreign_keys": [{"column": "id", "table": refs}]})
    };
    let source = document(json!({
        "version": "1.0",
        "tables": {
            "a": {"schema": {"columns": [column("b_id", "b")]}, "data": []},
            "b": {"schema": {"columns": [column("a_id", "a")]}, "data": []}
        }
    }));

    let err = orchestrator(&target, source).run().await.unwrap_err();
    match &err {
        SnapshotError::CyclicDependency { tables } => assert_eq!(tables, &vec!["a", "b"]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), 4);
    assert!(entries(&target.journal(), "create:").is_empty());
    assert!(target.journal().contains(&"rollback".to_string()));
    assert_eq!(target.connects(), 1);
}

#[tokio::test]
async fn test_dangling_reference_is_reported_and_ignored() {
    let target = MemoryConnector::new();
    let observer = Arc::new(RecordingObserver::new());
    let source = document(json!({
        "tables": {"posts": {
            "schema": {"columns": [
                {"name": "id", "type": {"type": "Integer"}, "primary_key": true},
                {"name": "author_id", "type": {"type": "Integer"},
                 "foreign_keys": [{"column": "id", "table": "authors"}]}
            ]},
            "data": [{"id": 1, "author_id": 7}]
        }}
    }));

    let report = orchestrator(&target, source)
        .with_observer(observer.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.tables, vec!["posts"]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("authors"));
    assert_eq!(
        observer.count(|e| matches!(e, Event::DanglingReference { .. })),
        1
    );
}

#[tokio::test]
async fn test_skipped_index_and_nulled_values_are_warnings() {
    let target = MemoryConnector::new();
    let source = document(json!({
        "version": "1.0",
        "tables": {"events": {
            "schema": {
                "columns": [
                    {"name": "id", "type": {"type": "Integer"}, "primary_key": true},
                    {"name": "at", "type": {"type": "DateTime"}},
                    {"name": "day", "type": {"type": "Date"}}
                ],
                "primary_keys": ["id"],
                "indexes": ["ix_unrelated"]
            },
            "data": [
                {"id": 1, "at": "yesterday", "day": "2024/03/01"},
                {"id": 2, "at": "2024-03-01 10:00", "day": null}
            ]
        }}
    }));

    let report = orchestrator(&target, source).run().await.unwrap();

    assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("ix_unrelated"));
    assert!(report.warnings[1].contains("events.at"));
    assert!(target.table("events").unwrap().indexes.is_empty());

    let rows = target.rows("events");
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    assert_eq!(rows[0][1], ("at".to_string(), SqlValue::Null));
    assert_eq!(rows[0][2], ("day".to_string(), SqlValue::Date(day)));
    assert_eq!(
        rows[1][1],
        (
            "at".to_string(),
            SqlValue::DateTime(day.and_hms_opt(10, 0, 0).unwrap())
        )
    );
}

#[tokio::test]
async fn test_rows_with_different_columns_are_inserted_separately() {
    let target = MemoryConnector::new();
    let source = document(json!({
        "tables": {"t": {
            "schema": {"columns": [
                {"name": "id", "type": {"type": "Integer"}, "primary_key": true},
                {"name": "note", "type": {"type": "Text"}, "default": "none"}
            ]},
            "data": [{"id": 1, "note": "x"}, {"note": "y", "id": 2}, {"id": 3}]
        }}
    }));

    let report = orchestrator(&target, source).run().await.unwrap();
    assert_eq!(report.rows, 3);
    assert_eq!(
        entries(&target.journal(), "insert:"),
        vec!["insert:t:2", "insert:t:1"]
    );
    assert_eq!(target.rows("t")[2], vec![("id".to_string(), SqlValue::I64(3))]);
}

#[tokio::test]
async fn test_unknown_row_column_is_malformed() {
    let target = MemoryConnector::new();
    let source = document(json!({
        "tables": {"t": {
            "schema": {"columns": [{"name": "id", "type": {"type": "Integer"}}]},
            "data": [{"id": 1, "bogus": 2}]
        }}
    }));

    let err = orchestrator(&target, source).run().await.unwrap_err();
    assert!(matches!(err, SnapshotError::Table { ref table, .. } if table == "t"));
    assert!(matches!(err.root(), SnapshotError::MalformedDocument(m) if m.contains("bogus")));
    assert_eq!(err.exit_code(), 3);
    assert!(target.table_names().is_empty());
}

#[tokio::test]
async fn test_unparseable_document_is_not_retried() {
    let target = MemoryConnector::new();
    let source = Arc::new(MemorySnapshot::with_bytes("{not json"));

    let err = orchestrator(&target, source).run().await.unwrap_err();
    assert!(matches!(err, SnapshotError::MalformedDocument(_)));
    assert_eq!(target.connects(), 0);
}

#[tokio::test]
async fn test_unknown_major_version_is_malformed() {
    let target = MemoryConnector::new();
    let source = document(json!({"version": "2.0", "tables": {}}));

    let err = orchestrator(&target, source).run().await.unwrap_err();
    assert!(matches!(err, SnapshotError::MalformedDocument(_)));
}

#[tokio::test(start_paused = true)]
async fn test_locked_attempts_are_retried_from_scratch() {
    let source = users_posts();
    let snapshot = snapshot_of(&source).await;
    let target = MemoryConnector::new().with_lock_failures(2);
    let observer = Arc::new(RecordingObserver::new());
    let start = tokio::time::Instant::now();

    let report = orchestrator(&target, snapshot)
        .with_observer(observer.clone())
        .run()
        .await
        .unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(11), "{:?}", elapsed);
    assert_eq!(report.attempts, 3);
    assert_eq!(target.connects(), 3);
    assert_eq!(
        observer.count(|e| matches!(e, Event::AttemptLocked { .. })),
        2
    );
    assert_eq!(
        observer.count(|e| matches!(
            e,
            Event::PhaseStarted {
                phase: RestorePhase::Commit,
                ..
            }
        )),
        1
    );
    assert_eq!(target.rows("posts").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_lock_retries_are_bounded() {
    let source = users_posts();
    let target = MemoryConnector::new().with_lock_failures(10);

    let err = orchestrator(&target, snapshot_of(&source).await)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(1)))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(target.connects(), 3);
    assert!(target.table_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_other_failures_roll_back_without_retry() {
    let source = users_posts();
    let target = MemoryConnector::new().failing_inserts_into("posts");
    let start = tokio::time::Instant::now();

    let err = orchestrator(&target, snapshot_of(&source).await)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::Table { ref table, .. } if table == "posts"));
    assert!(matches!(err.root(), SnapshotError::Store { .. }));
    assert_eq!(target.connects(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(target.table_names().is_empty());
    let journal = target.journal();
    assert!(journal.contains(&"rollback".to_string()));
    assert!(!journal.contains(&"commit".to_string()));
}
