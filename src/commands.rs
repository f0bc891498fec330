use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, get_config_dir};
use crate::embeddings::{Generator, ollama::OllamaClient};
use crate::extract::WebExtractor;
use crate::index::VectorStore;
use crate::ingest::IngestPipeline;
use crate::queue::IngestQueue;
use crate::retrieval::{ContextAssembler, build_messages};
use crate::store::Database;
use crate::worker::EmbeddingWorker;

/// Write the default configuration file if none exists yet
#[inline]
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    if config.config_file_path().exists() {
        println!(
            "Configuration already exists: {}",
            config.config_file_path().display()
        );
        println!("Edit the file directly, or use 'ragline config --show' to inspect it.");
        return Ok(());
    }

    config.save().context("Failed to write configuration")?;
    println!("Wrote default configuration: {}", config.config_file_path().display());

    Ok(())
}

/// Print the active configuration as TOML
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("# {}", config.config_file_path().display());
    println!("{}", rendered);

    Ok(())
}

/// Ingest a source reference: classify, extract, chunk, and enqueue
#[inline]
pub async fn ingest(reference: String, raw: bool) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    let queue = IngestQueue::new(database, config.queue);
    let pipeline = IngestPipeline::new(WebExtractor::new(), queue, config.chunking);

    info!("Ingesting source");
    let receipt = pipeline.ingest(&reference, raw).await?;

    println!("Ingestion queued successfully!");
    println!("  Documents extracted: {}", receipt.documents);
    println!("  Chunks queued: {}", receipt.chunks_queued);
    println!("  Batches sent: {}", receipt.batches_sent);
    println!();
    println!("Run 'ragline work' to embed the queued chunks.");

    Ok(())
}

/// Run the embedding worker: continuously, or for a single pass
#[inline]
pub async fn work(once: bool) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    let index = VectorStore::new(config.vector_database_path())
        .await
        .context("Failed to initialize vector store")?;
    let client = OllamaClient::new(config.ollama.clone()).context("Failed to create Ollama client")?;
    let queue = IngestQueue::new(database.clone(), config.queue);

    let mut worker = EmbeddingWorker::new(database, index, Arc::new(client), queue);

    if once {
        let summary = worker.process_available().await?;
        if summary.processed > 0 {
            worker
                .optimize_stores()
                .await
                .context("Failed to optimize stores")?;
        }
        println!("Worker pass complete:");
        println!("  Processed: {}", summary.processed);
        println!("  Requeued: {}", summary.requeued);
        println!("  Dead-lettered: {}", summary.dead_lettered);
        println!("  Buried: {}", summary.buried);
        return Ok(());
    }

    println!("Starting embedding worker (Ctrl+C to stop)...");
    tokio::select! {
        result = worker.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nReceived interrupt signal, shutting down...");
            Ok(())
        }
    }
}

/// Answer a question using retrieved context
#[inline]
pub async fn query(question: String, no_generate: bool) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    let index = VectorStore::new(config.vector_database_path())
        .await
        .context("Failed to initialize vector store")?;
    let client = OllamaClient::new(config.ollama.clone()).context("Failed to create Ollama client")?;
    let client = Arc::new(client);

    let assembler = ContextAssembler::new(database, Arc::clone(&client), config.retrieval);

    // Retrieval problems degrade to answering without context, never to a
    // failed query
    let context = match assembler.retrieve(&index, &question).await {
        Ok(context) => context,
        Err(e) => {
            warn!("Context retrieval failed, answering without context: {:#}", e);
            println!("Warning: context retrieval failed, answering without context.");
            crate::retrieval::RetrievedContext::default()
        }
    };

    if context.is_empty() {
        println!("No relevant context found.");
    } else {
        println!("Context ({} passages):", context.items.len());
        for item in &context.items {
            println!("  [{:.2}] {}", item.score, item.text);
        }
    }

    if no_generate {
        return Ok(());
    }

    println!();
    println!("Generating answer with {}...", config.ollama.chat_model);
    let messages = build_messages(&question, &context);
    let answer = client
        .generate(&messages)
        .context("Failed to generate answer")?;

    println!();
    println!("{}", answer);

    Ok(())
}

/// Show connectivity and pipeline status
#[inline]
pub async fn show_status() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    println!("📊 Ragline Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database = match Database::new(config.database_path()).await {
        Ok(db) => {
            println!("   ✅ SQLite: Connected");
            Some(db)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
            None
        }
    };

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config.ollama.clone()) {
        Ok(client) => match client.ping() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Chat Model: {}", config.ollama.chat_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unreachable - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {}", e);
        }
    }

    println!("🔍 Vector Database Status:");
    let vector_count = match VectorStore::new(config.vector_database_path()).await {
        Ok(store) => {
            println!("   ✅ LanceDB: Connected");
            store.count_embeddings().await.ok()
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
            None
        }
    };

    if let Some(database) = database {
        println!();
        println!("📦 Ingestion Queue:");
        let queue = IngestQueue::new(database.clone(), config.queue);
        match queue.stats().await {
            Ok(stats) => {
                println!("   ⏳ Pending: {}", stats.pending_count);
                println!("   🔄 Leased: {}", stats.leased_count);
                println!("   💀 Dead-lettered: {}", stats.dead_count);
            }
            Err(e) => {
                println!("   ❌ Failed to load queue statistics: {}", e);
            }
        }

        println!();
        println!("📚 Corpus:");
        match database.count_texts().await {
            Ok(count) => {
                println!("   📄 Text chunks stored: {}", count);
                if let Some(vectors) = vector_count {
                    println!("   🧮 Vectors indexed: {}", vectors);
                    if vectors < count as u64 {
                        println!(
                            "   ⚠️  {} chunks are not yet indexed",
                            count as u64 - vectors
                        );
                    }
                }
            }
            Err(e) => {
                println!("   ❌ Failed to count chunks: {}", e);
            }
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'ragline ingest <url>' to queue a source for indexing");
    println!("   • Use 'ragline work' to embed queued chunks");
    println!("   • Use 'ragline query <question>' to ask against the corpus");

    Ok(())
}
