//! Integration tests for the SQL front-end over the document store.

use std::sync::Arc;

use bulwark_sql::{Database, DatabaseConfig, Operation, SqlError, compile};
use bulwark_storage::{DocumentStore, FilterOp, MemoryDocumentStore};
use bulwark_test::FailingDocumentStore;
use serde_json::json;

fn database() -> Database {
    Database::new(Arc::new(MemoryDocumentStore::new()))
}

#[test]
fn test_compile_select_parameter_positions() {
    let parsed = compile(
        "SELECT id, name FROM users WHERE id = ? AND status = ? ORDER BY name DESC LIMIT ? OFFSET ?",
    );
    assert_eq!(parsed.op, Operation::Select);
    assert_eq!(parsed.table, "users");
    assert_eq!(parsed.columns, vec!["id", "name"]);
    assert_eq!(parsed.where_clauses.len(), 2);
    assert_eq!(parsed.where_clauses[0].param_index(), Some(0));
    assert_eq!(parsed.where_clauses[1].param_index(), Some(1));
    assert_eq!(parsed.where_clauses[1].op, FilterOp::Eq);
    assert_eq!(parsed.limit.as_ref().and_then(|l| l.param_index()), Some(2));
    assert_eq!(parsed.offset.as_ref().and_then(|o| o.param_index()), Some(3));
}

#[test]
fn test_compile_every_supported_form() {
    assert_eq!(compile("select count(*) from t where a = ?").op, Operation::Count);
    let insert = compile("INSERT INTO t (a, b) VALUES (?, ?)");
    assert_eq!(insert.op, Operation::Insert);
    assert_eq!(insert.columns, vec!["a", "b"]);
    let update = compile("UPDATE t SET a = ?, b = ? WHERE id = ?");
    assert_eq!(update.op, Operation::Update);
    assert_eq!(update.set_columns, vec!["a", "b"]);
    assert_eq!(update.where_clauses[0].param_index(), Some(2));
    let delete = compile("DELETE   FROM\n t WHERE id = ?");
    assert_eq!(delete.op, Operation::Delete);
    assert_eq!(delete.table, "t");
}

#[tokio::test]
async fn test_insert_then_projected_select() {
    let db = database();
    let inserted = db
        .prepare(
            "INSERT INTO prospect_leads (lead_id, source_id, entity_name, summary) VALUES (?, ?, ?, ?)",
        )
        .bind(["L1", "nvd", "Acme", "critical RCE"])
        .run()
        .await
        .unwrap();
    assert_eq!(inserted.meta.changes, 1);
    assert_eq!(inserted.meta.last_row_id.as_deref(), Some("L1"));

    let doc = db
        .store()
        .get("prospect_leads", "L1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.field("summary"), Some(&json!("critical RCE")));

    let rows = db
        .prepare("SELECT lead_id, entity_name FROM prospect_leads WHERE source_id = ?")
        .bind(["nvd"])
        .all()
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&rows.results).unwrap(),
        json!([{ "lead_id": "L1", "entity_name": "Acme" }])
    );
}

#[tokio::test]
async fn test_count_order_limit_offset() {
    let db = database();
    let insert = db.prepare("INSERT INTO scores (id, player, points) VALUES (?, ?, ?)");
    for (id, points) in [("a", 5), ("b", 9), ("c", 1), ("d", 7)] {
        insert
            .clone()
            .bind([json!(id), json!("p"), json!(points)])
            .run()
            .await
            .unwrap();
    }

    let count = db
        .prepare("SELECT COUNT(*) FROM scores WHERE player = ?")
        .bind(["p"])
        .first(Some("COUNT(*)"))
        .await
        .unwrap();
    assert_eq!(count, Some(json!(4)));

    let raw = db
        .prepare("SELECT id FROM scores ORDER BY points DESC LIMIT ? OFFSET ?")
        .bind([2, 1])
        .raw()
        .await
        .unwrap();
    assert_eq!(raw, vec![vec![json!("d")], vec![json!("a")]]);
}

#[tokio::test]
async fn test_batch_keeps_going_after_a_failure() {
    let db = database();
    let statements = vec![
        db.prepare("INSERT INTO t (id, v) VALUES (?, ?)").bind(["x", "1"]),
        db.prepare("INSERT INTO t (id, v) VALUES (?, ?)").bind(["x", "2"]),
        db.prepare("INSERT INTO t (id, v) VALUES (?, ?)").bind(["y", "3"]),
    ];
    let results = db.batch(&statements).await;
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn test_partial_batch_keeps_committed_chunks() {
    let store = Arc::new(FailingDocumentStore::in_memory(2).fail_commit(2));
    let db = Database::with_config(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        DatabaseConfig {
            max_batch_size: 2,
            statement_cache_capacity: 16,
        },
    );
    let insert = db.prepare("INSERT INTO jobs (id, state) VALUES (?, ?)");
    for id in ["j1", "j2", "j3", "j4", "j5"] {
        insert.clone().bind([id, "queued"]).run().await.unwrap();
    }

    let err = db
        .prepare("UPDATE jobs SET state = ? WHERE state = ?")
        .bind(["done", "queued"])
        .run()
        .await
        .unwrap_err();
    match err {
        SqlError::PartialBatch {
            committed,
            failed_chunks,
            total_chunks,
            ..
        } => {
            assert_eq!(committed, 3);
            assert_eq!(failed_chunks, 1);
            assert_eq!(total_chunks, 3);
        },
        other => panic!("expected partial batch, got {other:?}"),
    }

    let remaining = db
        .prepare("SELECT COUNT(*) FROM jobs WHERE state = ?")
        .bind(["queued"])
        .first(Some("COUNT(*)"))
        .await
        .unwrap();
    assert_eq!(remaining, Some(json!(2)));
}

#[tokio::test]
async fn test_unavailable_store_propagates() {
    let store = Arc::new(FailingDocumentStore::in_memory(500));
    store.set_unavailable(true);
    let db = Database::new(store);
    let err = db.exec("SELECT * FROM anything").await.unwrap_err();
    assert!(matches!(err, SqlError::Storage(_)));
}
