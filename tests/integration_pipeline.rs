#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ragline::chunking::ChunkingConfig;
use ragline::embeddings::Embedder;
use ragline::extract::{Document, SourceKind, TextExtractor, WebExtractor};
use ragline::index::VectorStore;
use ragline::ingest::IngestPipeline;
use ragline::queue::{IngestQueue, QueueConfig};
use ragline::retrieval::{ContextAssembler, RetrievalConfig, build_messages};
use ragline::store::Database;
use ragline::worker::EmbeddingWorker;

/// Deterministic embedder: identical texts embed to identical unit vectors,
/// so similarity search behaves like exact lookup without a model server
struct ToyEmbedder;

impl Embedder for ToyEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 8];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % 8] += f32::from(byte) / 255.0;
                }
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut vector {
                        *x /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

/// Extractor that skips the network and returns its input as one document
struct PassthroughExtractor;

impl TextExtractor for PassthroughExtractor {
    fn extract(&self, reference: &str, _kind: SourceKind) -> ragline::Result<Vec<Document>> {
        Ok(vec![Document {
            text: reference.to_string(),
            source: "manual".to_string(),
            page: None,
        }])
    }
}

struct TestStores {
    database: Database,
    index: VectorStore,
    queue: IngestQueue,
}

async fn create_test_stores(temp_dir: &TempDir) -> Result<TestStores> {
    let database = Database::new(temp_dir.path().join("ragline.db")).await?;
    let index = VectorStore::new(temp_dir.path().join("vectors")).await?;
    let queue = IngestQueue::new(database.clone(), QueueConfig::default());
    Ok(TestStores {
        database,
        index,
        queue,
    })
}

#[tokio::test]
async fn ingest_work_query_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let stores = create_test_stores(&temp_dir).await?;

    // Ingest: small chunk geometry so one sentence spans several chunks
    let chunking = ChunkingConfig {
        chunk_size: 4,
        chunk_overlap: 1,
    };
    let pipeline = IngestPipeline::new(PassthroughExtractor, stores.queue.clone(), chunking);
    let receipt = pipeline.ingest("A. B. C.", true).await?;
    assert_eq!(receipt.chunks_queued, 3);

    // Work: drain the queue into the stores
    let embedder: Arc<dyn Embedder> = Arc::new(ToyEmbedder);
    let mut worker = EmbeddingWorker::new(
        stores.database.clone(),
        stores.index,
        Arc::clone(&embedder),
        stores.queue.clone(),
    );
    let summary = worker.process_available().await?;
    assert_eq!(summary.processed, 3);

    let stats = stores.queue.stats().await?;
    assert_eq!(stats.total_count, 0, "Queue should be drained");
    assert_eq!(stores.database.count_texts().await?, 3);

    // Query: an exact chunk text must come back as the top context passage
    let index = VectorStore::new(temp_dir.path().join("vectors")).await?;
    let assembler = ContextAssembler::new(
        stores.database.clone(),
        Arc::clone(&embedder),
        RetrievalConfig::default(),
    );
    let context = assembler.retrieve(&index, "A. B").await?;

    assert!(!context.is_empty(), "Exact text should clear the cutoff");
    assert_eq!(context.items[0].text, "A. B");

    // And the context flows into the prompt
    let messages = build_messages("A. B", &context);
    assert!(messages[0].content.contains("A. B"));

    Ok(())
}

#[tokio::test]
async fn worker_pass_is_idempotent_when_queue_is_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let stores = create_test_stores(&temp_dir).await?;

    let embedder: Arc<dyn Embedder> = Arc::new(ToyEmbedder);
    let mut worker = EmbeddingWorker::new(
        stores.database.clone(),
        stores.index,
        embedder,
        stores.queue.clone(),
    );

    let first = worker.process_available().await?;
    let second = worker.process_available().await?;
    assert_eq!(first.total(), 0);
    assert_eq!(second.total(), 0);

    Ok(())
}

#[tokio::test]
async fn rejects_plain_text_without_raw_flag() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let stores = create_test_stores(&temp_dir).await?;

    let pipeline = IngestPipeline::new(
        PassthroughExtractor,
        stores.queue.clone(),
        ChunkingConfig::default(),
    );

    let result = pipeline.ingest("not a url and not raw", false).await;
    assert!(result.is_err());

    let stats = stores.queue.stats().await?;
    assert_eq!(stats.total_count, 0, "Rejected input must never be queued");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn web_page_ingestion_strips_markup() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"
            <!DOCTYPE html>
            <html>
            <head><title>Ignored Title</title></head>
            <body>
                <h1>Visible Heading</h1>
                <p>Visible paragraph text.</p>
                <script>var hidden = "should not appear";</script>
            </body>
            </html>
            "#,
            "text/html",
        ))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new()?;
    let stores = create_test_stores(&temp_dir).await?;

    let pipeline = IngestPipeline::new(
        WebExtractor::new(),
        stores.queue.clone(),
        ChunkingConfig::default(),
    );

    let url = format!("{}/article", server.uri());
    let receipt = pipeline.ingest(&url, false).await?;
    assert_eq!(receipt.documents, 1);
    assert!(receipt.chunks_queued >= 1);

    let messages = stores.queue.lease(10).await?;
    let body = &messages[0].body;
    assert!(body.contains("Visible Heading"));
    assert!(body.contains("Visible paragraph text."));
    assert!(!body.contains("should not appear"));

    Ok(())
}
