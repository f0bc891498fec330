use super::*;
use tempfile::TempDir;

fn create_test_record(id: &str) -> EmbeddingRecord {
    // Consistent dimension across tests, with a small per-id perturbation so
    // vectors are distinct
    let mut test_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let id_num: f32 = id.parse().unwrap_or(1.0);
    for (i, val) in test_vector.iter_mut().enumerate() {
        *val += id_num.mul_add(0.01, i as f32 * 0.001);
    }

    EmbeddingRecord {
        id: id.to_string(),
        vector: test_vector,
        metadata: VectorMetadata {
            source: "https://example.com/test".to_string(),
            page: None,
            seq: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    }
}

#[tokio::test]
async fn vector_store_initialization() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let result = VectorStore::new(temp_dir.path().join("vectors")).await;
    assert!(
        result.is_ok(),
        "Failed to initialize VectorStore: {:?}",
        result.err()
    );

    let store = result.expect("should get result successfully");
    assert_eq!(store.table_name, "embeddings");
}

#[tokio::test]
async fn upsert_and_count() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_record("1"),
        create_test_record("2"),
        create_test_record("3"),
    ];

    store
        .upsert_embeddings(records)
        .await
        .expect("should store embeddings successfully");

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn upsert_same_id_replaces() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    store
        .upsert_embeddings(vec![create_test_record("1")])
        .await
        .expect("should store embedding successfully");

    // Redelivered message: same id, possibly recomputed vector
    let mut replacement = create_test_record("1");
    replacement.vector = vec![0.9, 0.9, 0.9, 0.9, 0.9];
    store
        .upsert_embeddings(vec![replacement])
        .await
        .expect("should replace embedding successfully");

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 1, "Upsert with same id should not grow the table");

    let results = store
        .query(&[0.9, 0.9, 0.9, 0.9, 0.9], 10)
        .await
        .expect("search should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "1");
}

#[tokio::test]
async fn query_returns_scored_matches() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    let records = vec![
        create_test_record("1"),
        create_test_record("2"),
        create_test_record("3"),
    ];

    store
        .upsert_embeddings(records)
        .await
        .expect("should store embeddings successfully");

    let query_vector = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    let results = store
        .query(&query_vector, 10)
        .await
        .expect("search should succeed");

    assert!(!results.is_empty(), "Should find similar embeddings");
    assert!(results.len() <= 3, "Should not return more than stored");

    for result in &results {
        assert!(!result.id.is_empty());
        assert!(result.score <= 1.0);
        assert!(result.distance >= 0.0);
    }
}

#[tokio::test]
async fn query_respects_limit() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    let records = (1..=5)
        .map(|i| create_test_record(&i.to_string()))
        .collect();
    store
        .upsert_embeddings(records)
        .await
        .expect("should store embeddings successfully");

    let results = store
        .query(&[0.1, 0.2, 0.3, 0.4, 0.5], 2)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn empty_batch_handling() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    let result = store.upsert_embeddings(vec![]).await;
    assert!(result.is_ok(), "Should handle empty batch gracefully");

    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn dimension_change_recreates_table() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    store
        .upsert_embeddings(vec![create_test_record("1")])
        .await
        .expect("should store 5-dim embedding");
    assert_eq!(store.vector_dimension, Some(5));

    let wider = EmbeddingRecord {
        id: "2".to_string(),
        vector: vec![0.0; 8],
        metadata: VectorMetadata {
            source: "manual".to_string(),
            page: None,
            seq: 0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
    };
    store
        .upsert_embeddings(vec![wider])
        .await
        .expect("should store 8-dim embedding after recreation");

    assert_eq!(store.vector_dimension, Some(8));
    let count = store
        .count_embeddings()
        .await
        .expect("should count embeddings successfully");
    assert_eq!(count, 1, "Recreation drops previous rows");
}

#[tokio::test]
async fn optimize_database() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut store = VectorStore::new(temp_dir.path().join("vectors"))
        .await
        .expect("should create vector store");

    store
        .upsert_embeddings(vec![create_test_record("1")])
        .await
        .expect("should store embedding successfully");

    let result = store.optimize().await;
    assert!(
        result.is_ok(),
        "Failed to optimize database: {:?}",
        result.err()
    );
}
