pub mod data_loader;
pub mod embedding_engine;
pub mod query;
pub mod recipe_index;
pub mod retriever;

use anyhow::Result;
use async_trait::async_trait;

pub use data_loader::{load_recipe_documents, split_text, RecipeDocument};
pub use embedding_engine::{Embedder, EmbeddingEngine, EMBEDDING_DIMENSION};
pub use query::build_retrieval_query;
pub use recipe_index::{IndexedChunk, RecipeIndex};
pub use retriever::RecipeRetriever;

/// One similarity-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeChunk {
    pub title: Option<String>,
    pub text: String,
    pub score: f32,
}

/// Similarity search over the recipe corpus.
#[async_trait]
pub trait RecipeSearch: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RecipeChunk>>;

    /// Fails when the backend cannot serve queries (missing or empty index).
    async fn check_available(&self) -> Result<()> {
        Ok(())
    }
}
