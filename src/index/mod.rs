//! Vector Index - immutable pairing of embeddings with their documents
//!
//! Row `i` of the embedding matrix belongs to document `i`. That positional
//! correspondence is the only linkage, so an index is never edited in place:
//! a changed collection means a full rebuild.

pub mod builder;
pub mod format;

use crate::error::{Result, RoamerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One destination or experience record. Schema-flexible; only the
/// identifier, name and embedding-source fields are ever interpreted.
pub type Document = serde_json::Map<String, Value>;

/// The two document collections the planner searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Destination,
    Experience,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Destination, CollectionKind::Experience];

    pub fn id_field(&self) -> &'static str {
        match self {
            CollectionKind::Destination => "destination_id",
            CollectionKind::Experience => "experience_id",
        }
    }

    pub fn name_field(&self) -> &'static str {
        match self {
            CollectionKind::Destination => "destination_name",
            CollectionKind::Experience => "experience_name",
        }
    }

    /// File name inside the shared index directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            CollectionKind::Destination => "destination_index.rmx",
            CollectionKind::Experience => "experience_index.rmx",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Destination => "destination",
            CollectionKind::Experience => "experience",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String value of `field`, if present and a JSON string.
pub fn field_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_type: CollectionKind,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub num_documents: usize,
    pub fields_embedded: Vec<String>,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Row-major N x D matrix.
    matrix: Vec<f32>,
    documents: Vec<Document>,
    metadata: IndexMetadata,
}

impl VectorIndex {
    /// Build from per-document rows. Rejects count or dimension disagreement.
    pub fn new(
        embeddings: Vec<Vec<f32>>,
        documents: Vec<Document>,
        metadata: IndexMetadata,
    ) -> Result<Self> {
        let dimension = metadata.embedding_dimension;
        if dimension == 0 {
            return Err(RoamerError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if embeddings.len() != documents.len() {
            return Err(RoamerError::CorruptIndex(format!(
                "{} embeddings for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let mut matrix = Vec::with_capacity(embeddings.len() * dimension);
        for row in &embeddings {
            if row.len() != dimension {
                return Err(RoamerError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            matrix.extend_from_slice(row);
        }

        Self::from_matrix(matrix, documents, metadata)
    }

    /// Build from an already flattened matrix (the persisted layout).
    pub fn from_matrix(
        matrix: Vec<f32>,
        documents: Vec<Document>,
        metadata: IndexMetadata,
    ) -> Result<Self> {
        let dimension = metadata.embedding_dimension;
        if dimension == 0 {
            return Err(RoamerError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if documents.len() != metadata.num_documents {
            return Err(RoamerError::CorruptIndex(format!(
                "metadata declares {} documents, found {}",
                metadata.num_documents,
                documents.len()
            )));
        }
        if matrix.len() % dimension != 0 {
            return Err(RoamerError::DimensionMismatch {
                expected: dimension,
                actual: matrix.len() % dimension,
            });
        }
        let rows = matrix.len() / dimension;
        if rows != documents.len() {
            return Err(RoamerError::CorruptIndex(format!(
                "{} embedding rows for {} documents",
                rows,
                documents.len()
            )));
        }

        Ok(Self {
            matrix,
            documents,
            metadata,
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.metadata.index_type
    }

    pub fn dimension(&self) -> usize {
        self.metadata.embedding_dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, i: usize) -> Option<&Document> {
        self.documents.get(i)
    }

    /// The flattened N x D matrix.
    pub fn matrix(&self) -> &[f32] {
        &self.matrix
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let d = self.dimension();
        self.matrix.get(i * d..(i + 1) * d)
    }

    /// Embedding rows in document order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.matrix.chunks_exact(self.dimension())
    }

    /// Identifier of document `i` under this collection's id field.
    pub fn document_id(&self, i: usize) -> Option<&str> {
        self.documents
            .get(i)
            .and_then(|d| field_str(d, self.kind().id_field()))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    pub fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    pub fn metadata(kind: CollectionKind, dimension: usize, n: usize) -> IndexMetadata {
        IndexMetadata {
            index_type: kind,
            embedding_model: "scripted".to_string(),
            embedding_dimension: dimension,
            num_documents: n,
            fields_embedded: vec!["one_line_pitch".to_string(), "semantic_profile".to_string()],
            built_at: DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    /// Five destinations D1..D5 sitting on the unit axes of a 5-d space.
    pub fn unit_destinations() -> VectorIndex {
        let mut embeddings = Vec::new();
        let mut documents = Vec::new();
        for i in 0..5 {
            let mut v = vec![0.0; 5];
            v[i] = 1.0;
            embeddings.push(v);
            documents.push(doc(json!({
                "destination_id": format!("D{}", i + 1),
                "destination_name": format!("Destination {}", i + 1),
                "one_line_pitch": format!("pitch {}", i + 1),
            })));
        }
        VectorIndex::new(embeddings, documents, metadata(CollectionKind::Destination, 5, 5)).unwrap()
    }

    /// Experiences across D1 (two) and D2 (three), on a 3-d space.
    pub fn experiences() -> VectorIndex {
        let rows = [
            ("E1", "D1", [1.0, 0.0, 0.0]),
            ("E2", "D2", [0.9, 0.1, 0.0]),
            ("E3", "D1", [0.0, 1.0, 0.0]),
            ("E4", "D2", [0.0, 0.0, 1.0]),
            ("E5", "D2", [0.7, 0.7, 0.0]),
        ];
        let embeddings = rows.iter().map(|(_, _, v)| v.to_vec()).collect();
        let documents = rows
            .iter()
            .map(|(id, parent, _)| {
                doc(json!({
                    "experience_id": id,
                    "experience_name": format!("Experience {}", id),
                    "parent_destination_id": parent,
                }))
            })
            .collect();
        VectorIndex::new(embeddings, documents, metadata(CollectionKind::Experience, 3, 5)).unwrap()
    }
}
