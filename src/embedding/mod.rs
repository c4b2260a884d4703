//! Embedding providers
//!
//! The retrieval core only consumes the [`Embedder`] contract: one vector per
//! input string, fixed dimension, order preserved. Indexing embeds with
//! [`TaskType::Document`], searching with [`TaskType::Query`].

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod google;
pub mod hashing;
pub mod retry;

/// Which side of retrieval a text is embedded for. Some providers encode
/// documents and queries asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "RETRIEVAL_DOCUMENT")]
    Document,
    #[serde(rename = "RETRIEVAL_QUERY")]
    Query,
}

impl TaskType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in index metadata.
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;

    /// Embed several texts. Output order matches input order.
    /// Default calls `embed()` once per text.
    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, task).await?);
        }
        Ok(out)
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProviderType::Google => Ok(Arc::new(google::GoogleEmbedder::new(config)?)),
        EmbeddingProviderType::Hashing => {
            Ok(Arc::new(hashing::HashingEmbedder::new(config.dimension)))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_wire_names() {
        assert_eq!(TaskType::Document.as_wire(), "RETRIEVAL_DOCUMENT");
        assert_eq!(TaskType::Query.as_wire(), "RETRIEVAL_QUERY");
        assert_eq!(
            serde_json::to_string(&TaskType::Query).unwrap(),
            "\"RETRIEVAL_QUERY\""
        );
    }

    #[test]
    fn test_create_hashing_embedder() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Hashing,
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_id(), "hashing-v1-32");
    }

    #[test]
    fn test_google_embedder_requires_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            create_embedder(&config),
            Err(crate::error::RoamerError::Configuration(_))
        ));
    }
}
