use super::*;
use tempfile::TempDir;

async fn test_database() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("can create database");
    (database, temp_dir)
}

#[tokio::test]
async fn insert_assigns_stable_ids() {
    let (database, _temp_dir) = test_database().await;

    let first = database.insert_text("alpha").await.expect("insert");
    let second = database.insert_text("beta").await.expect("insert");

    assert_eq!(first.text, "alpha");
    assert_eq!(second.text, "beta");
    assert!(second.id > first.id);

    let refetched = database
        .get_text_by_id(first.id)
        .await
        .expect("lookup")
        .expect("record exists");
    assert_eq!(refetched, first);
}

#[tokio::test]
async fn batched_lookup_returns_requested_rows() {
    let (database, _temp_dir) = test_database().await;

    let a = database.insert_text("a").await.expect("insert");
    let b = database.insert_text("b").await.expect("insert");
    let c = database.insert_text("c").await.expect("insert");

    let records = database
        .get_texts_by_ids(&[c.id, a.id])
        .await
        .expect("lookup");

    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.id == a.id));
    assert!(records.iter().any(|r| r.id == c.id));
    assert!(!records.iter().any(|r| r.id == b.id));
}

#[tokio::test]
async fn batched_lookup_tolerates_missing_ids() {
    let (database, _temp_dir) = test_database().await;

    let a = database.insert_text("a").await.expect("insert");
    let records = database
        .get_texts_by_ids(&[a.id, a.id + 100])
        .await
        .expect("lookup");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, a.id);
}

#[tokio::test]
async fn empty_id_set_skips_query() {
    let (database, _temp_dir) = test_database().await;
    let records = database.get_texts_by_ids(&[]).await.expect("lookup");
    assert!(records.is_empty());
}

#[tokio::test]
async fn count_reflects_inserts() {
    let (database, _temp_dir) = test_database().await;

    assert_eq!(database.count_texts().await.expect("count"), 0);
    database.insert_text("x").await.expect("insert");
    database.insert_text("y").await.expect("insert");
    assert_eq!(database.count_texts().await.expect("count"), 2);
}

#[tokio::test]
async fn duplicate_text_creates_distinct_records() {
    // At-least-once redelivery may insert the same content twice; the store
    // assigns a fresh id each time.
    let (database, _temp_dir) = test_database().await;

    let first = database.insert_text("same").await.expect("insert");
    let second = database.insert_text("same").await.expect("insert");

    assert_ne!(first.id, second.id);
    assert_eq!(database.count_texts().await.expect("count"), 2);
}
