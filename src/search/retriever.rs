use anyhow::Result;
use std::sync::Arc;

use super::{RecipeChunk, RecipeSearch};

pub const DEFAULT_MAX_DOCS: usize = 5;
pub const DEFAULT_MAX_CHARS: usize = 750;

const SEPARATOR: &str = "\n\n---\n\n";

/// Turns similarity-search hits into a prompt-ready context block.
#[derive(Clone)]
pub struct RecipeRetriever {
    search: Arc<dyn RecipeSearch>,
    max_docs: usize,
    max_chars: usize,
}

impl RecipeRetriever {
    pub fn new(search: Arc<dyn RecipeSearch>) -> Self {
        Self {
            search,
            max_docs: DEFAULT_MAX_DOCS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_limits(mut self, max_docs: usize, max_chars: usize) -> Self {
        self.max_docs = max_docs;
        self.max_chars = max_chars;
        self
    }

    pub async fn check_available(&self) -> Result<()> {
        self.search.check_available().await
    }

    /// Formatted context for `query`, or an empty string when the search fails
    /// or finds nothing. Never returns an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> String {
        match self.search.similarity_search(query, k).await {
            Ok(chunks) => {
                tracing::debug!(query, hits = chunks.len(), "recipe retrieval");
                self.format(&chunks)
            }
            Err(err) => {
                tracing::warn!(query, error = %err, "RAG retrieval failed");
                String::new()
            }
        }
    }

    fn format(&self, chunks: &[RecipeChunk]) -> String {
        chunks
            .iter()
            .take(self.max_docs)
            .map(|chunk| {
                let title = chunk.title.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or("Untitled");
                format!("Title: {}\n{}", title, truncate(chunk.text.trim(), self.max_chars))
            })
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
