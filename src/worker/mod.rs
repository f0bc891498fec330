
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::embeddings::Embedder;
use crate::index::{EmbeddingRecord, VectorMetadata, VectorStore};
use crate::queue::{IngestQueue, LeasedMessage, MESSAGE_SCHEMA_VERSION, NackOutcome, QueuedChunk};
use crate::store::Database;

const IDLE_WAIT: Duration = Duration::from_secs(5);
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Background worker that drains the ingest queue: each message becomes a
/// text row plus an embedding vector, then is acknowledged.
pub struct EmbeddingWorker {
    database: Database,
    index: VectorStore,
    embedder: Arc<dyn Embedder>,
    queue: IngestQueue,
}

/// Outcome counts for one lease-and-process pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    pub processed: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub buried: usize,
}

impl PassSummary {
    #[inline]
    pub fn total(&self) -> usize {
        self.processed + self.requeued + self.dead_lettered + self.buried
    }
}

impl EmbeddingWorker {
    #[inline]
    pub fn new(
        database: Database,
        index: VectorStore,
        embedder: Arc<dyn Embedder>,
        queue: IngestQueue,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            queue,
        }
    }

    /// Run the worker loop until interrupted, sleeping while the queue is idle
    #[inline]
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting embedding worker");

        loop {
            match self.process_available().await {
                Ok(summary) if summary.total() == 0 => {
                    debug!("Queue is idle");
                    sleep(IDLE_WAIT).await;
                }
                Ok(summary) => {
                    debug!(
                        "Pass complete: {} processed, {} requeued, {} dead-lettered, {} buried",
                        summary.processed,
                        summary.requeued,
                        summary.dead_lettered,
                        summary.buried
                    );
                    sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    error!("Error in worker loop: {}", e);
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Reclaim stale leases, then lease and process one batch of messages.
    ///
    /// Each message is acknowledged only after both its text row and its
    /// vector are durably written, so a crash between the writes and the ack
    /// causes redelivery rather than loss.
    #[inline]
    pub async fn process_available(&mut self) -> Result<PassSummary> {
        let reclaimed = self
            .queue
            .reset_stale()
            .await
            .context("Failed to reclaim stale leases")?;
        if reclaimed > 0 {
            warn!("Reclaimed {} stale leases for redelivery", reclaimed);
        }

        let lease_batch_size = self.queue.config().lease_batch_size;
        let messages = self
            .queue
            .lease(lease_batch_size)
            .await
            .context("Failed to lease messages")?;

        let mut summary = PassSummary::default();

        for message in messages {
            let chunk = match Self::decode_message(&message) {
                Ok(chunk) => chunk,
                Err(reason) => {
                    warn!("Burying poison message {}: {}", message.id, reason);
                    self.queue
                        .bury(message.id, &reason)
                        .await
                        .context("Failed to bury poison message")?;
                    summary.buried += 1;
                    continue;
                }
            };

            match self.handle_chunk(&chunk).await {
                Ok(text_id) => {
                    self.queue
                        .ack(message.id)
                        .await
                        .context("Failed to acknowledge message")?;
                    debug!("Processed message {} into text row {}", message.id, text_id);
                    summary.processed += 1;
                }
                Err(e) => {
                    warn!("Processing message {} failed: {:#}", message.id, e);
                    let outcome = self
                        .queue
                        .nack(message.id, &format!("{:#}", e))
                        .await
                        .context("Failed to nack message")?;
                    match outcome {
                        NackOutcome::Requeued => summary.requeued += 1,
                        NackOutcome::DeadLettered => {
                            error!("Message {} exhausted retries, dead-lettered", message.id);
                            summary.dead_lettered += 1;
                        }
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Compact both stores after a batch of writes
    #[inline]
    pub async fn optimize_stores(&mut self) -> Result<()> {
        self.database
            .optimize()
            .await
            .context("Failed to optimize text store")?;
        self.index
            .optimize()
            .await
            .context("Failed to optimize vector store")?;
        Ok(())
    }

    /// Parse a message body; a failure here can never succeed on retry
    fn decode_message(message: &LeasedMessage) -> Result<QueuedChunk, String> {
        let chunk: QueuedChunk = serde_json::from_str(&message.body)
            .map_err(|e| format!("Malformed message body: {}", e))?;

        if chunk.version > MESSAGE_SCHEMA_VERSION {
            return Err(format!(
                "Unsupported message schema version {} (supported up to {})",
                chunk.version, MESSAGE_SCHEMA_VERSION
            ));
        }

        Ok(chunk)
    }

    async fn handle_chunk(&mut self, chunk: &QueuedChunk) -> Result<i64> {
        let row = self
            .database
            .insert_text(&chunk.content)
            .await
            .context("Failed to store chunk text")?;

        let vectors = self
            .embedder
            .embed(std::slice::from_ref(&chunk.content))
            .context("Failed to generate embedding")?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedder returned no vector for chunk"))?;

        let record = EmbeddingRecord {
            id: row.id.to_string(),
            vector,
            metadata: VectorMetadata {
                source: chunk.metadata.source.clone(),
                page: chunk.metadata.page,
                seq: chunk.metadata.seq as u32,
                created_at: Utc::now().to_rfc3339(),
            },
        };

        self.index
            .upsert_embeddings(vec![record])
            .await
            .context("Failed to store embedding")?;

        Ok(row.id)
    }
}
