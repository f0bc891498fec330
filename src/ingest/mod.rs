
use tracing::{debug, info};

use crate::chunking::{ChunkingConfig, batch_chunks, chunk_document};
use crate::extract::{SourceKind, TextExtractor, classify_source};
use crate::queue::IngestQueue;
use crate::{RaglineError, Result};

/// What one ingestion request produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub documents: usize,
    pub chunks_queued: usize,
    pub batches_sent: usize,
}

/// Front half of ingestion: classify, extract, chunk, and enqueue.
/// Embedding happens later, when a worker drains the queue.
pub struct IngestPipeline<E> {
    extractor: E,
    queue: IngestQueue,
    chunking: ChunkingConfig,
}

impl<E: TextExtractor> IngestPipeline<E> {
    #[inline]
    pub fn new(extractor: E, queue: IngestQueue, chunking: ChunkingConfig) -> Self {
        Self {
            extractor,
            queue,
            chunking,
        }
    }

    /// Ingest a source reference: a URL, or literal text when `raw` is set.
    ///
    /// Returns once every chunk is durably queued; nothing is embedded yet.
    #[inline]
    pub async fn ingest(&self, reference: &str, raw: bool) -> Result<IngestReceipt> {
        let kind = classify_source(reference, raw);
        if kind == SourceKind::Invalid {
            return Err(RaglineError::Input(format!(
                "'{}' is not a URL; pass raw text explicitly to ingest it verbatim",
                reference
            )));
        }
        debug!("Classified ingestion source as {:?}", kind);

        let documents = self.extractor.extract(reference, kind)?;

        let mut chunks = Vec::new();
        for document in &documents {
            chunks.extend(chunk_document(document, &self.chunking));
        }
        info!(
            "Extracted {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let chunks_queued = chunks.len();
        let batches = batch_chunks(chunks, self.queue.config().max_batch_size);
        let batches_sent = batches.len();

        for batch in &batches {
            self.queue.submit_batch(batch).await?;
        }
        debug!("Queued {} batches", batches_sent);

        Ok(IngestReceipt {
            documents: documents.len(),
            chunks_queued,
            batches_sent,
        })
    }
}
