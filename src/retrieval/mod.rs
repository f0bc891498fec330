
use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::{ChatMessage, Embedder};
use crate::index::{VectorMatch, VectorStore};
use crate::store::Database;

const ANSWER_INSTRUCTION: &str =
    "When answering the question or responding, use the context provided, if it is provided and relevant.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbors to pull from the vector index
    pub top_k: usize,
    /// Minimum similarity score a match must exceed to be used as context
    pub similarity_cutoff: f32,
    /// Maximum number of context passages included in the prompt
    pub max_context_items: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            similarity_cutoff: 0.65,
            max_context_items: 3,
        }
    }
}

/// A context passage recovered from the relational store for a vector match
#[derive(Debug, Clone, PartialEq)]
pub struct ContextItem {
    pub id: i64,
    pub text: String,
    pub score: f32,
}

/// Context assembled for one question
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub items: Vec<ContextItem>,
}

impl RetrievedContext {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keep matches that clear the similarity cutoff, preserving index order,
/// capped at the configured context size.
///
/// A score exactly at the cutoff is rejected.
#[inline]
pub fn select_matches(matches: Vec<VectorMatch>, config: &RetrievalConfig) -> Vec<VectorMatch> {
    matches
        .into_iter()
        .filter(|m| m.score > config.similarity_cutoff)
        .take(config.max_context_items)
        .collect()
}

/// Turns a question into ranked context passages by combining the vector
/// index with the relational text store
pub struct ContextAssembler {
    database: Database,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl ContextAssembler {
    #[inline]
    pub fn new(database: Database, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self {
            database,
            embedder,
            config,
        }
    }

    /// Retrieve context for `question`. An empty result is not an error:
    /// answering proceeds without context.
    #[inline]
    pub async fn retrieve(&self, index: &VectorStore, question: &str) -> Result<RetrievedContext> {
        let vectors = self
            .embedder
            .embed(&[question.to_string()])
            .context("Failed to embed question")?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedder returned no vector for question"))?;

        let matches = index
            .query(&query_vector, self.config.top_k)
            .await
            .context("Vector search failed")?;
        debug!("Vector search returned {} matches", matches.len());

        let selected = select_matches(matches, &self.config);
        if selected.is_empty() {
            debug!("No matches cleared the similarity cutoff");
            return Ok(RetrievedContext::default());
        }

        // Vector ids are stringified row ids of the texts table. A malformed
        // id means the index holds an entry we cannot resolve; skip it.
        let mut ids = Vec::with_capacity(selected.len());
        for m in &selected {
            match m.id.parse::<i64>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!("Skipping vector match with non-numeric id: {}", m.id),
            }
        }
        let ids: Vec<i64> = ids.into_iter().unique().collect();

        let records = self
            .database
            .get_texts_by_ids(&ids)
            .await
            .context("Failed to load context texts")?;
        let texts: HashMap<i64, String> =
            records.into_iter().map(|r| (r.id, r.text)).collect();

        // Reassemble in match order so the strongest context comes first
        let mut items = Vec::with_capacity(selected.len());
        for m in selected {
            let Ok(id) = m.id.parse::<i64>() else {
                continue;
            };
            if let Some(text) = texts.get(&id) {
                if items.iter().any(|item: &ContextItem| item.id == id) {
                    continue;
                }
                items.push(ContextItem {
                    id,
                    text: text.clone(),
                    score: m.score,
                });
            } else {
                warn!("Vector match {} has no backing text row", id);
            }
        }

        Ok(RetrievedContext { items })
    }
}

/// Build the chat messages for answering `question` with optional retrieved
/// context. Context passages become a system message ahead of the fixed
/// answering instruction.
#[inline]
pub fn build_messages(question: &str, context: &RetrievedContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(3);

    if !context.is_empty() {
        let passages = context
            .items
            .iter()
            .map(|item| format!("- {}", item.text))
            .join("\n");
        messages.push(ChatMessage::system(format!("Context:\n{}", passages)));
    }

    messages.push(ChatMessage::system(ANSWER_INSTRUCTION));
    messages.push(ChatMessage::user(question));

    messages
}
