//! Embedding generation seam.
//!
//! The embedding collaborator is consumed through the [`Embedder`] trait;
//! concrete model providers live outside this crate. [`HashEmbedder`] is the
//! in-crate deterministic implementation used by tests and offline runs.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

use async_trait::async_trait;

use crate::{Error, Result};

/// Whether a text is embedded as stored content or as a query.
///
/// Providers that distinguish document and query embeddings (asymmetric
/// models) receive this; symmetric providers may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// Embedding a chunk for storage.
    Document,
    /// Embedding a query for retrieval.
    Query,
}

impl EmbedMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

/// Trait for embedding generators.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    async fn embed_batch(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text, mode).await?);
        }
        Ok(embeddings)
    }
}

/// Deterministic hash-based embedder.
///
/// Generates pseudo-embeddings from content hashing. Identical texts produce
/// identical vectors, which is what the pipeline tests need; it does NOT
/// capture semantic similarity between different texts.
pub struct HashEmbedder {
    /// Embedding dimensions.
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of the given dimension.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Generates a deterministic pseudo-embedding from text.
    ///
    /// Creates a normalized vector based on content hashing.
    fn pseudo_embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        // Bound computation on very long texts
        const MAX_WORDS: usize = 1000;
        let mut embedding = vec![0.0f32; self.dimensions];

        for (i, word) in text.split_whitespace().take(MAX_WORDS).enumerate() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();
            Self::distribute_hash(&mut embedding, hash, i, self.dimensions);
        }

        Self::normalize_embedding(&mut embedding);
        embedding
    }

    /// Distributes a hash value across embedding dimensions.
    fn distribute_hash(embedding: &mut [f32], hash: u64, word_idx: usize, dimensions: usize) {
        for j in 0..8 {
            let idx = ((hash >> (j * 8)) as usize + word_idx) % dimensions;
            let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
            embedding[idx] += value;
        }
    }

    /// Normalizes an embedding vector in-place.
    fn normalize_embedding(embedding: &mut [f32]) {
        let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
        if norm_sq <= 0.0 {
            return;
        }
        let inv_norm = norm_sq.sqrt().recip();
        for v in embedding.iter_mut() {
            *v *= inv_norm;
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(self.pseudo_embed(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_is_deterministic() {
        let embedder = HashEmbedder::new(384);
        let a = embedder
            .embed("postgres storage layer", EmbedMode::Document)
            .await
            .expect("embed failed");
        let b = embedder
            .embed("postgres storage layer", EmbedMode::Query)
            .await
            .expect("embed failed");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn test_embed_is_normalized() {
        let embedder = HashEmbedder::new(128);
        let v = embedder
            .embed("some chunk text", EmbedMode::Document)
            .await
            .expect("embed failed");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_text() {
        let embedder = HashEmbedder::new(128);
        assert!(embedder.embed("", EmbedMode::Query).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = HashEmbedder::new(64);
        let texts = ["first", "second", "third"];
        let batch = embedder
            .embed_batch(&texts, EmbedMode::Document)
            .await
            .expect("embed_batch failed");
        assert_eq!(batch.len(), 3);
        let first = embedder
            .embed("first", EmbedMode::Document)
            .await
            .expect("embed failed");
        assert_eq!(batch[0], first);
    }
}
