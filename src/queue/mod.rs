// Durable ingestion queue backed by the SQLite database.
// At-least-once delivery: a leased message that is never acknowledged
// returns to pending once its lease goes stale, so consumers must tolerate
// redelivery. Acknowledgment removes the message permanently.


use anyhow::{Context, Result, bail};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunking::{Chunk, ChunkMetadata};
use crate::store::Database;

/// Version tag carried in every queued message body so the schema can evolve
pub const MESSAGE_SCHEMA_VERSION: u32 = 1;

/// Queue processing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Hard ceiling on messages per batch submission (transport limit)
    pub max_batch_size: usize,
    /// Delivery attempts before a message moves to the dead-letter state
    pub max_retries: u32,
    /// Maximum messages handed to a consumer per lease call
    pub lease_batch_size: usize,
    /// Seconds before a leased message is considered stale and redelivered
    pub lease_timeout_seconds: u64,
}

impl Default for QueueConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_retries: 3,
            lease_batch_size: 64,
            lease_timeout_seconds: 300,
        }
    }
}

/// Wire schema for a queued chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedChunk {
    pub version: u32,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl QueuedChunk {
    #[inline]
    pub fn from_chunk(chunk: Chunk) -> Self {
        Self {
            version: MESSAGE_SCHEMA_VERSION,
            content: chunk.content,
            metadata: chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Leased,
    Dead,
}

/// A message handed to a consumer; unacknowledged messages are redelivered
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LeasedMessage {
    pub id: i64,
    pub body: String,
    pub retry_count: i64,
}

/// A permanently failed message
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: i64,
    pub body: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
}

/// Outcome of a negative acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Requeued,
    DeadLettered,
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub pending_count: u64,
    pub leased_count: u64,
    pub dead_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone)]
pub struct IngestQueue {
    database: Database,
    config: QueueConfig,
}

impl IngestQueue {
    #[inline]
    pub fn new(database: Database, config: QueueConfig) -> Self {
        Self { database, config }
    }

    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Submit one batch of chunks. Each batch is an independent, retryable
    /// unit of delivery; the transport ceiling is enforced here.
    #[inline]
    pub async fn submit_batch(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.len() > self.config.max_batch_size {
            bail!(
                "Batch of {} messages exceeds queue limit of {}",
                chunks.len(),
                self.config.max_batch_size
            );
        }

        if chunks.is_empty() {
            return Ok(());
        }

        let now = Utc::now().naive_utc();
        let mut tx = self
            .database
            .pool()
            .begin()
            .await
            .context("Failed to begin queue transaction")?;

        for chunk in chunks {
            let message = QueuedChunk::from_chunk(chunk.clone());
            let body = serde_json::to_string(&message)
                .context("Failed to serialize queued chunk")?;

            sqlx::query(
                "INSERT INTO ingest_queue (body, status, created_date) VALUES (?, ?, ?)",
            )
            .bind(&body)
            .bind(QueueStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to enqueue chunk")?;
        }

        tx.commit().await.context("Failed to commit queue batch")?;

        debug!("Submitted batch of {} messages", chunks.len());
        Ok(())
    }

    /// Lease up to `limit` pending messages for processing. Lease order is
    /// creation order on a best-effort basis only; consumers must not depend
    /// on cross-batch ordering.
    #[inline]
    pub async fn lease(&self, limit: usize) -> Result<Vec<LeasedMessage>> {
        let now = Utc::now().naive_utc();
        let mut tx = self
            .database
            .pool()
            .begin()
            .await
            .context("Failed to begin lease transaction")?;

        let messages = sqlx::query_as::<_, LeasedMessage>(
            "SELECT id, body, retry_count FROM ingest_queue \
             WHERE status = ? ORDER BY created_date ASC, id ASC LIMIT ?",
        )
        .bind(QueueStatus::Pending)
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to select pending messages")?;

        for message in &messages {
            sqlx::query("UPDATE ingest_queue SET status = ?, leased_date = ? WHERE id = ?")
                .bind(QueueStatus::Leased)
                .bind(now)
                .bind(message.id)
                .execute(&mut *tx)
                .await
                .context("Failed to mark message as leased")?;
        }

        tx.commit().await.context("Failed to commit lease")?;

        debug!("Leased {} messages", messages.len());
        Ok(messages)
    }

    /// Acknowledge a message, removing it from the queue permanently
    #[inline]
    pub async fn ack(&self, message_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ingest_queue WHERE id = ?")
            .bind(message_id)
            .execute(self.database.pool())
            .await
            .context("Failed to acknowledge message")?;

        debug!("Acknowledged message {}", message_id);
        Ok(())
    }

    /// Negative acknowledgment for a transient failure: return the message to
    /// pending for redelivery, or dead-letter it once retries are exhausted.
    #[inline]
    pub async fn nack(&self, message_id: i64, error_message: &str) -> Result<NackOutcome> {
        let retry_count: i64 =
            sqlx::query_scalar("SELECT retry_count FROM ingest_queue WHERE id = ?")
                .bind(message_id)
                .fetch_one(self.database.pool())
                .await
                .context("Failed to read retry count")?;

        let new_retry_count = retry_count + 1;

        if new_retry_count >= i64::from(self.config.max_retries) {
            sqlx::query(
                "UPDATE ingest_queue SET status = ?, retry_count = ?, error_message = ?, leased_date = NULL WHERE id = ?",
            )
            .bind(QueueStatus::Dead)
            .bind(new_retry_count)
            .bind(error_message)
            .bind(message_id)
            .execute(self.database.pool())
            .await
            .context("Failed to dead-letter message")?;

            warn!(
                "Message {} dead-lettered after {} attempts: {}",
                message_id, new_retry_count, error_message
            );
            Ok(NackOutcome::DeadLettered)
        } else {
            sqlx::query(
                "UPDATE ingest_queue SET status = ?, retry_count = ?, error_message = ?, leased_date = NULL WHERE id = ?",
            )
            .bind(QueueStatus::Pending)
            .bind(new_retry_count)
            .bind(error_message)
            .bind(message_id)
            .execute(self.database.pool())
            .await
            .context("Failed to requeue message")?;

            info!(
                "Message {} requeued for retry {}: {}",
                message_id, new_retry_count, error_message
            );
            Ok(NackOutcome::Requeued)
        }
    }

    /// Move a poisoned (malformed) message straight to the dead-letter state.
    /// Poison is non-retryable; requeueing it would loop forever.
    #[inline]
    pub async fn bury(&self, message_id: i64, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_queue SET status = ?, error_message = ?, leased_date = NULL WHERE id = ?",
        )
        .bind(QueueStatus::Dead)
        .bind(error_message)
        .bind(message_id)
        .execute(self.database.pool())
        .await
        .context("Failed to bury message")?;

        warn!("Message {} buried as poison: {}", message_id, error_message);
        Ok(())
    }

    /// Return long-leased messages to pending. This is the redelivery path
    /// after a consumer crash, and the source of at-least-once duplicates.
    #[inline]
    pub async fn reset_stale(&self) -> Result<u64> {
        let cutoff = Utc::now().naive_utc()
            - chrono::Duration::seconds(self.config.lease_timeout_seconds as i64);

        let reset = sqlx::query(
            "UPDATE ingest_queue SET status = ?, leased_date = NULL \
             WHERE status = ? AND leased_date < ?",
        )
        .bind(QueueStatus::Pending)
        .bind(QueueStatus::Leased)
        .bind(cutoff)
        .execute(self.database.pool())
        .await
        .context("Failed to reset stale leases")?
        .rows_affected();

        if reset > 0 {
            warn!("Reset {} stale leased messages for redelivery", reset);
        }

        Ok(reset)
    }

    #[inline]
    pub async fn stats(&self) -> Result<QueueStats> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = 'leased' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = 'dead' THEN 1 ELSE 0 END), 0) \
             FROM ingest_queue",
        )
        .fetch_optional(self.database.pool())
        .await
        .context("Failed to get queue statistics")?
        .unwrap_or((0, 0, 0));

        let (pending, leased, dead) = row;
        Ok(QueueStats {
            pending_count: pending.max(0) as u64,
            leased_count: leased.max(0) as u64,
            dead_count: dead.max(0) as u64,
            total_count: (pending + leased + dead).max(0) as u64,
        })
    }

    /// List permanently failed messages
    #[inline]
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let letters = sqlx::query_as::<_, DeadLetter>(
            "SELECT id, body, retry_count, error_message, created_date \
             FROM ingest_queue WHERE status = ? ORDER BY created_date ASC",
        )
        .bind(QueueStatus::Dead)
        .fetch_all(self.database.pool())
        .await
        .context("Failed to list dead letters")?;

        Ok(letters)
    }
}
