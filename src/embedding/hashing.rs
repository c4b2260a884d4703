//! Offline feature-hashing embedder
//!
//! Bag-of-words vectors: each lower-cased token is hashed with SHA-256, the
//! digest picks a bucket and a sign, and the result is L2-normalised. Stable
//! across runs and platforms, so indexes built with it can be reloaded later.
//! Text without any token embeds to the zero vector.

use crate::embedding::{Embedder, TaskType};
use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-v1-{}", dimension),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in embedding.iter_mut() {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    // Symmetric: document and query embeddings share one space.
    async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
