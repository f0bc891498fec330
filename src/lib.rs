use thiserror::Error;

pub type Result<T> = std::result::Result<T, RaglineError>;

#[derive(Error, Debug)]
pub enum RaglineError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod queue;
pub mod retrieval;
pub mod store;
pub mod worker;
