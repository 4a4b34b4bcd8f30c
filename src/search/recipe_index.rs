//! Cosine-similarity index over recipe chunks, persisted as a single JSON
//! file with the vector matrix stored as base64 of the raw f32 bytes (host
//! byte order).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::embedding_engine::Embedder;
use super::{RecipeChunk, RecipeSearch};

const EMBED_BATCH_SIZE: usize = 256;

/// A chunk as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    embedding_dim: usize,
    chunks: Vec<IndexedChunk>,
    #[serde(with = "base64_matrix")]
    matrix: Vec<f32>,
}

mod base64_matrix {
    use base64::{engine::general_purpose, Engine as _};
    use bytemuck::cast_slice;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(matrix: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(cast_slice::<f32, u8>(matrix)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(serde::de::Error::custom(format!(
                "matrix byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vec![0.0; vector.len()]
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cloning is cheap: chunks and vectors are shared until the next upsert.
#[derive(Clone)]
pub struct RecipeIndex {
    embedder: Arc<dyn Embedder>,
    embedding_dim: usize,
    chunks: Arc<Vec<IndexedChunk>>,
    matrix: Arc<Vec<f32>>,
}

impl RecipeIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedding_dim: embedder.dimension(),
            embedder,
            chunks: Arc::default(),
            matrix: Arc::default(),
        }
    }

    /// Embeds `chunks` into a fresh index.
    pub fn build(embedder: Arc<dyn Embedder>, chunks: Vec<IndexedChunk>) -> Result<Self> {
        let mut index = Self::new(embedder);
        index.upsert(chunks)?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn row(&self, index: usize) -> &[f32] {
        let start = index * self.embedding_dim;
        &self.matrix[start..start + self.embedding_dim]
    }

    /// Embeds and inserts chunks; a chunk whose id already exists replaces it.
    /// Returns `(inserted, updated)`.
    pub fn upsert(&mut self, chunks: Vec<IndexedChunk>) -> Result<(usize, usize)> {
        let dim = self.embedding_dim;
        let embedder = &self.embedder;
        let stored = Arc::make_mut(&mut self.chunks);
        let matrix = Arc::make_mut(&mut self.matrix);
        let mut positions: HashMap<String, usize> = stored
            .iter()
            .enumerate()
            .map(|(i, chunk)| (chunk.id.clone(), i))
            .collect();
        let (mut inserted, mut updated) = (0, 0);

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = embedder
                .embed(&texts)
                .context("Failed to embed recipe chunks")?;
            if embeddings.len() != batch.len() {
                bail!(
                    "Embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                );
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != dim {
                    bail!(
                        "Embedding dimension mismatch for chunk '{}'. Expected {}, got {}.",
                        chunk.id,
                        dim,
                        embedding.len()
                    );
                }
                let vector = normalize(&embedding);
                match positions.get(&chunk.id) {
                    Some(&pos) => {
                        let start = pos * dim;
                        matrix[start..start + dim].copy_from_slice(&vector);
                        stored[pos] = chunk.clone();
                        updated += 1;
                    }
                    None => {
                        positions.insert(chunk.id.clone(), stored.len());
                        matrix.extend_from_slice(&vector);
                        stored.push(chunk.clone());
                        inserted += 1;
                    }
                }
            }
            tracing::debug!(indexed = stored.len(), "embedded batch of recipe chunks");
        }
        Ok((inserted, updated))
    }

    /// Top `k` chunks by cosine similarity, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RecipeChunk>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query = normalize(&self.embedder.embed_one(query)?);
        if query.len() != self.embedding_dim {
            bail!(
                "Search query embedding dimension mismatch. Expected {}, got {}.",
                self.embedding_dim,
                query.len()
            );
        }

        let mut scored: Vec<(usize, f32)> = (0..self.chunks.len())
            .into_par_iter()
            .map(|i| (i, dot(self.row(i), &query)))
            .filter(|(_, score)| !score.is_nan())
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| RecipeChunk {
                title: self.chunks[i].title.clone(),
                text: self.chunks[i].text.clone(),
                score,
            })
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            embedding_dim: self.embedding_dim,
            chunks: self.chunks.to_vec(),
            matrix: self.matrix.to_vec(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create index directory {:?}", parent))?;
        }
        let contents = serde_json::to_string(&file)?;
        fs::write(path, contents).with_context(|| format!("Failed to write recipe index to {:?}", path))?;
        tracing::info!(path = ?path, chunks = self.chunks.len(), "recipe index saved");
        Ok(())
    }

    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if !path.exists() {
            bail!("Recipe index not found at {:?}. Run the build-index command first.", path);
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read recipe index {:?}", path))?;
        let file: IndexFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse recipe index {:?}", path))?;

        if file.embedding_dim != embedder.dimension() {
            bail!(
                "Embedding dimension mismatch: index has {}, embedder produces {}",
                file.embedding_dim,
                embedder.dimension()
            );
        }
        let expected_len = file.chunks.len() * file.embedding_dim;
        if file.matrix.len() != expected_len {
            bail!("Matrix size mismatch: expected {}, got {}", expected_len, file.matrix.len());
        }

        Ok(Self {
            embedder,
            embedding_dim: file.embedding_dim,
            chunks: Arc::new(file.chunks),
            matrix: Arc::new(file.matrix),
        })
    }
}

#[async_trait]
impl RecipeSearch for RecipeIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RecipeChunk>> {
        let index = self.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || index.search(&query, k))
            .await
            .context("Recipe search task panicked")?
    }

    async fn check_available(&self) -> Result<()> {
        if self.is_empty() {
            bail!("Recipe index is empty. Run the build-index command first.");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Bag-of-words hashing embedder; shared words give positive similarity.
    pub struct HashingEmbedder {
        pub dimension: usize,
    }

    impl Embedder for HashingEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut vector = vec![0.0; self.dimension];
                    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                        if word.is_empty() {
                            continue;
                        }
                        let bucket = word
                            .bytes()
                            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                            % self.dimension;
                        vector[bucket] += 1.0;
                    }
                    vector
                })
                .collect())
        }
    }

    pub fn chunk(id: &str, title: &str, text: &str) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            title: Some(title.to_string()),
            text: text.to_string(),
        }
    }
}
