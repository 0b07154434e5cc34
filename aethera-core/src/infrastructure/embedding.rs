// aethera-core/src/infrastructure/embedding.rs
//
// Embedding provider port + the default deterministic local provider.
// External providers (HTTP APIs) plug in behind the same trait; dimension
// D is fixed per deployment and recorded with every stored embedding.

use crate::error::AetheraError;
use crate::infrastructure::error::InfrastructureError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f64>, AetheraError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, AetheraError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Deterministic bag-of-hashed-tokens embedder. Not a language model, but
/// good enough for similarity retrieval over report sections and fully
/// reproducible offline.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self, AetheraError> {
        if dim < 8 {
            return Err(AetheraError::Infrastructure(InfrastructureError::Embedding(
                format!("embedding dimension {dim} is too small"),
            )));
        }
        Ok(Self { dim })
    }

    fn embed_sync(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0f64; self.dim];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket =
                u64::from_le_bytes(digest[0..8].try_into().unwrap_or_default()) as usize % self.dim;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 1e-12 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>, AetheraError> {
        Ok(self.embed_sync(text))
    }
}

/// Cosine similarity of two equal-dimension vectors, clamped to [0, 1].
pub fn cosine_score(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na <= 1e-12 || nb <= 1e-12 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}
