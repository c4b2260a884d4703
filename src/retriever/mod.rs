//! Semantic Retriever - query-time engine over loaded indexes
//!
//! Two modes per call, never both:
//! - identifier lookup: documents whose id field is in the given set, in index order
//! - semantic search: optional field filter, cosine ranking, top-K
//!
//! Loaded indexes sit behind `Arc`s. Loading swaps the `Arc`, so a query that
//! already took its snapshot finishes against the index it started with.

pub mod filter;
pub mod similarity;

pub use filter::FieldFilter;

use crate::embedding::{Embedder, TaskType};
use crate::error::{Result, RoamerError};
use crate::index::{format, CollectionKind, Document, VectorIndex};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// What the caller is asking for. Exactly one mode per call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalQuery {
    Text(String),
    Ids(Vec<String>),
}

impl RetrievalQuery {
    /// Build from optional inputs; neither or both is an invalid call.
    /// A blank query string counts as absent.
    pub fn from_parts(query: Option<String>, ids: Option<Vec<String>>) -> Result<Self> {
        let query = query.filter(|q| !q.trim().is_empty());
        match (query, ids) {
            (Some(_), Some(_)) => Err(RoamerError::invalid_call(
                "supply either a query or identifiers, not both",
            )),
            (Some(q), None) => Ok(RetrievalQuery::Text(q)),
            (None, Some(ids)) => Ok(RetrievalQuery::Ids(ids)),
            (None, None) => Err(RoamerError::invalid_call(
                "must provide either a query or identifiers",
            )),
        }
    }
}

/// Result of [`SemanticRetriever::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieved {
    Ranked(Vec<ScoredDocument>),
    Matched(Vec<Document>),
}

impl Retrieved {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Retrieved::Ranked(hits) => hits.into_iter().map(|h| h.document).collect(),
            Retrieved::Matched(docs) => docs,
        }
    }
}

type Slot = RwLock<Option<Arc<VectorIndex>>>;

pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    destinations: Slot,
    experiences: Slot,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            destinations: RwLock::new(None),
            experiences: RwLock::new(None),
        }
    }

    fn slot(&self, kind: CollectionKind) -> &Slot {
        match kind {
            CollectionKind::Destination => &self.destinations,
            CollectionKind::Experience => &self.experiences,
        }
    }

    /// Load both indexes from `dir`. Nothing is swapped in unless both load
    /// and each file holds the collection its name promises.
    pub fn load_from_dir(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(RoamerError::Configuration(format!(
                "Index directory not found: {}",
                dir.display()
            )));
        }

        let mut loaded = Vec::with_capacity(CollectionKind::ALL.len());
        for kind in CollectionKind::ALL {
            let path = dir.join(kind.file_name());
            let index = format::load(&path)?;
            if index.kind() != kind {
                return Err(RoamerError::Configuration(format!(
                    "{} holds a {} index, expected {}",
                    path.display(),
                    index.kind(),
                    kind
                )));
            }
            loaded.push(index);
        }

        for index in loaded {
            info!(
                kind = %index.kind(),
                documents = index.len(),
                dimension = index.dimension(),
                "Loaded vector index"
            );
            self.install(index);
        }
        Ok(())
    }

    /// Swap in `index` for its collection kind, returning the previous one.
    pub fn install(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let model = &index.metadata().embedding_model;
        if model != self.embedder.model_id() {
            warn!(
                kind = %index.kind(),
                index_model = %model,
                query_model = self.embedder.model_id(),
                "Index was built with a different embedding model"
            );
        }

        let kind = index.kind();
        let mut guard = self
            .slot(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.replace(Arc::new(index))
    }

    /// The index currently serving `kind`.
    pub fn snapshot(&self, kind: CollectionKind) -> Result<Arc<VectorIndex>> {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RoamerError::NotInitialized(kind))
    }

    /// Documents whose identifier is in `ids`, in index order.
    pub fn lookup(&self, kind: CollectionKind, ids: &[String]) -> Result<Vec<Document>> {
        let index = self.snapshot(kind)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let id_field = kind.id_field();
        let found: Vec<Document> = index
            .documents()
            .iter()
            .filter(|doc| {
                crate::index::field_str(doc, id_field).is_some_and(|id| wanted.contains(id))
            })
            .cloned()
            .collect();

        debug!(kind = %kind, requested = ids.len(), found = found.len(), "Identifier lookup");
        Ok(found)
    }

    /// Rank documents of `kind` against `query`, optionally restricted by `filter`.
    pub async fn search(
        &self,
        kind: CollectionKind,
        query: &str,
        filter: Option<&FieldFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Err(RoamerError::invalid_call("top_k must be at least 1"));
        }
        if query.trim().is_empty() {
            return Err(RoamerError::invalid_call("query must not be empty"));
        }

        let index = self.snapshot(kind)?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<usize> = match filter {
            Some(f) => (0..index.len())
                .filter(|&i| index.document(i).is_some_and(|d| f.matches(d)))
                .collect(),
            None => (0..index.len()).collect(),
        };
        if candidates.is_empty() {
            debug!(kind = %kind, filter = ?filter, "No documents survive the filter");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query, TaskType::Query).await?;
        if query_embedding.len() != index.dimension() {
            return Err(RoamerError::DimensionMismatch {
                expected: index.dimension(),
                actual: query_embedding.len(),
            });
        }
        let unit_query = similarity::normalize(&query_embedding).ok_or_else(|| {
            RoamerError::DegenerateEmbedding("query embedding has zero or non-finite norm".to_string())
        })?;

        let mut scored = Vec::with_capacity(candidates.len());
        for i in candidates {
            let Some(row) = index.row(i) else { continue };
            match similarity::cosine_to_unit(&unit_query, row) {
                Some(score) => scored.push((i, score)),
                None => warn!(
                    kind = %kind,
                    row = i,
                    id = index.document_id(i).unwrap_or("?"),
                    "Skipping document with zero-norm embedding"
                ),
            }
        }

        let hits = similarity::rank(scored, top_k)
            .into_iter()
            .filter_map(|(i, score)| {
                index.document(i).map(|d| ScoredDocument {
                    document: d.clone(),
                    score,
                })
            })
            .collect();
        Ok(hits)
    }

    /// Dispatch on the query mode. The filter and `top_k` only apply to text queries.
    pub async fn retrieve(
        &self,
        kind: CollectionKind,
        query: RetrievalQuery,
        filter: Option<&FieldFilter>,
        top_k: usize,
    ) -> Result<Retrieved> {
        match query {
            RetrievalQuery::Ids(ids) => Ok(Retrieved::Matched(self.lookup(kind, &ids)?)),
            RetrievalQuery::Text(q) => Ok(Retrieved::Ranked(self.search(kind, &q, filter, top_k).await?)),
        }
    }
}
