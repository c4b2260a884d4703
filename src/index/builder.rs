//! Index Builder - documents in, [`VectorIndex`] out
//!
//! Each document contributes one embedding-source string (the configured
//! fields, space-joined). Sources are embedded in DOCUMENT mode in fixed-size
//! batches; batching never changes the output order. Any provider failure
//! aborts the build, since a missing row would break the row/document pairing.

use crate::embedding::{Embedder, TaskType};
use crate::error::{Result, RoamerError};
use crate::index::{format, CollectionKind, Document, IndexMetadata, VectorIndex};
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_EMBEDDED_FIELDS: [&str; 2] = ["one_line_pitch", "semantic_profile"];
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Text embedded for `doc`: `fields` in order, space-joined. Missing fields,
/// nulls, arrays and objects contribute an empty string; numbers and
/// booleans contribute their JSON text.
pub fn embedding_source(doc: &Document, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| match doc.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => String::new(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    fields: Vec<String>,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            fields: DEFAULT_EMBEDDED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Batch size, clamped to at least one document per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub async fn build(&self, kind: CollectionKind, documents: Vec<Document>) -> Result<VectorIndex> {
        if documents.is_empty() {
            return Err(RoamerError::invalid_call(format!(
                "cannot build a {} index from an empty collection",
                kind
            )));
        }
        if self.fields.is_empty() {
            return Err(RoamerError::invalid_call("no embedding-source fields configured"));
        }

        let sources: Vec<String> = documents
            .iter()
            .map(|doc| embedding_source(doc, &self.fields))
            .collect();

        let total_batches = sources.len().div_ceil(self.batch_size);
        info!(
            kind = %kind,
            documents = documents.len(),
            batches = total_batches,
            model = self.embedder.model_id(),
            "Building vector index"
        );

        let mut embeddings = Vec::with_capacity(sources.len());
        for (batch_no, batch) in sources.chunks(self.batch_size).enumerate() {
            debug!(batch = batch_no + 1, of = total_batches, size = batch.len(), "Embedding batch");

            let vectors = self.embedder.embed_batch(batch, TaskType::Document).await?;
            if vectors.len() != batch.len() {
                return Err(RoamerError::Provider(format!(
                    "provider returned {} embeddings for a batch of {}",
                    vectors.len(),
                    batch.len()
                )));
            }
            if let Some(offset) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
                return Err(RoamerError::Provider(format!(
                    "provider returned non-finite values for document {}",
                    batch_no * self.batch_size + offset
                )));
            }
            embeddings.extend(vectors);
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(RoamerError::Provider("provider returned empty embeddings".to_string()));
        }

        let metadata = IndexMetadata {
            index_type: kind,
            embedding_model: self.embedder.model_id().to_string(),
            embedding_dimension: dimension,
            num_documents: documents.len(),
            fields_embedded: self.fields.clone(),
            built_at: Utc::now(),
        };

        let index = VectorIndex::new(embeddings, documents, metadata)?;
        info!(kind = %kind, documents = index.len(), dimension, "Vector index built");
        Ok(index)
    }

    /// Build from a JSON file holding an array of document objects.
    pub async fn build_from_json_file(&self, kind: CollectionKind, path: &Path) -> Result<VectorIndex> {
        let documents = read_documents(path)?;
        self.build(kind, documents).await
    }

    /// Build from `source` and persist under `index_dir` with the kind's file name.
    pub async fn build_and_save(
        &self,
        kind: CollectionKind,
        source: &Path,
        index_dir: &Path,
    ) -> Result<(VectorIndex, PathBuf)> {
        let index = self.build_from_json_file(kind, source).await?;
        let path = index_dir.join(kind.file_name());
        format::save(&index, &path)?;
        info!(kind = %kind, path = %path.display(), "Vector index saved");
        Ok((index, path))
    }
}

/// Load a document collection (JSON array of objects).
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    if !path.exists() {
        return Err(RoamerError::Configuration(format!(
            "Document collection not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&content)?;
    Ok(documents)
}
