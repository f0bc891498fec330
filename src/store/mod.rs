#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use std::path::Path;
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// Durable representation of an ingested chunk. The store assigns the id;
/// the vector index holds only this id, never a copy of the text.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TextRecord {
    pub id: i64,
    pub text: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/store/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Persist chunk text, returning the newly assigned record
    #[inline]
    pub async fn insert_text(&self, text: &str) -> Result<TextRecord> {
        let now = Utc::now().naive_utc();

        let record = sqlx::query_as::<_, TextRecord>(
            "INSERT INTO texts (text, created_date) VALUES (?, ?) RETURNING id, text, created_date",
        )
        .bind(text)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert chunk record")?;

        debug!("Stored chunk record {}", record.id);
        Ok(record)
    }

    /// Resolve a set of record ids in a single batched lookup. Rows come back
    /// in database order; callers needing a particular order reorder by id.
    #[inline]
    pub async fn get_texts_by_ids(&self, ids: &[i64]) -> Result<Vec<TextRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, text, created_date FROM texts WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<TextRecord>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to resolve chunk records")?;

        debug!("Resolved {} of {} requested records", records.len(), ids.len());
        Ok(records)
    }

    #[inline]
    pub async fn get_text_by_id(&self, id: i64) -> Result<Option<TextRecord>> {
        let record = sqlx::query_as::<_, TextRecord>(
            "SELECT id, text, created_date FROM texts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up chunk record")?;

        Ok(record)
    }

    #[inline]
    pub async fn count_texts(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM texts")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count chunk records")?;

        Ok(count)
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
