//! Retrieval Toolkit - the two operations the planning layer may call
//!
//! Construct once at startup and hand out by reference.

use crate::config::RetrievalConfig;
use crate::error::{Result, RoamerError};
use crate::index::{field_str, CollectionKind, Document};
use crate::retriever::{FieldFilter, RetrievalQuery, Retrieved, ScoredDocument, SemanticRetriever};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_DESTINATION_TOP_K: usize = 3;
pub const DEFAULT_EXPERIENCE_TOP_K: usize = 7;

/// Destination search shape: semantic (top-down) or by id (bottom-up).
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationQuery {
    Semantic { query: String, top_k: usize },
    Lookup { ids: Vec<String> },
}

impl DestinationQuery {
    pub fn lookup<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DestinationQuery::Lookup {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// From loosely-typed inputs. Neither or both is an invalid call.
    pub fn from_parts(
        query: Option<String>,
        destination_ids: Option<Vec<String>>,
        top_k: Option<usize>,
    ) -> Result<Self> {
        match RetrievalQuery::from_parts(query, destination_ids)? {
            RetrievalQuery::Text(query) => Ok(DestinationQuery::Semantic {
                query,
                top_k: top_k.unwrap_or(DEFAULT_DESTINATION_TOP_K),
            }),
            RetrievalQuery::Ids(ids) => Ok(DestinationQuery::Lookup { ids }),
        }
    }
}

pub struct RetrievalToolkit {
    retriever: Arc<SemanticRetriever>,
    destination_top_k: usize,
    experience_top_k: usize,
}

impl RetrievalToolkit {
    pub fn new(retriever: Arc<SemanticRetriever>) -> Self {
        Self {
            retriever,
            destination_top_k: DEFAULT_DESTINATION_TOP_K,
            experience_top_k: DEFAULT_EXPERIENCE_TOP_K,
        }
    }

    /// Override the default K values from configuration.
    pub fn with_config(mut self, config: &RetrievalConfig) -> Self {
        self.destination_top_k = config.destination_top_k;
        self.experience_top_k = config.experience_top_k;
        self
    }

    pub fn destination_top_k(&self) -> usize {
        self.destination_top_k
    }

    pub async fn search_destinations(&self, query: DestinationQuery) -> Result<Vec<Document>> {
        match query {
            DestinationQuery::Lookup { ids } => Ok(self
                .retriever
                .retrieve(
                    CollectionKind::Destination,
                    RetrievalQuery::Ids(ids),
                    None,
                    self.destination_top_k,
                )
                .await?
                .into_documents()),
            DestinationQuery::Semantic { query, top_k } => Ok(self
                .search_destinations_scored(&query, top_k)
                .await?
                .into_iter()
                .map(|h| h.document)
                .collect()),
        }
    }

    pub async fn search_destinations_scored(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let hits = self
            .retriever
            .search(CollectionKind::Destination, query, None, top_k)
            .await?;
        log_hits(CollectionKind::Destination, query, None, &hits);
        Ok(hits)
    }

    /// `top_k` of `None` uses the configured default (7 unless overridden).
    pub async fn search_experiences(
        &self,
        query: &str,
        destination_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<Document>> {
        Ok(self
            .search_experiences_scored(query, destination_id, top_k)
            .await?
            .into_iter()
            .map(|h| h.document)
            .collect())
    }

    pub async fn search_experiences_scored(
        &self,
        query: &str,
        destination_id: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredDocument>> {
        let filter = destination_id.map(FieldFilter::parent_destination);
        let retrieved = self
            .retriever
            .retrieve(
                CollectionKind::Experience,
                RetrievalQuery::Text(query.to_string()),
                filter.as_ref(),
                top_k.unwrap_or(self.experience_top_k),
            )
            .await?;

        let hits = match retrieved {
            Retrieved::Ranked(hits) => hits,
            Retrieved::Matched(_) => {
                return Err(RoamerError::invalid_call("experience search requires a query"))
            }
        };
        log_hits(CollectionKind::Experience, query, destination_id, &hits);
        Ok(hits)
    }
}

fn log_hits(kind: CollectionKind, query: &str, scope: Option<&str>, hits: &[ScoredDocument]) {
    info!(kind = %kind, query, scope, results = hits.len(), "Semantic search");
    for (rank, hit) in hits.iter().enumerate() {
        info!(
            rank = rank + 1,
            name = field_str(&hit.document, kind.name_field()).unwrap_or("?"),
            id = field_str(&hit.document, kind.id_field()).unwrap_or("?"),
            score = format_args!("{:.3}", hit.score),
            "Ranked {}",
            kind
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::embedding::testing::ScriptedEmbedder;
    use crate::index::fixtures::{experiences, unit_destinations};

    /// Toolkit over the unit-vector destinations and the five-experience fixture.
    pub fn toolkit(embedder: ScriptedEmbedder) -> (Arc<ScriptedEmbedder>, RetrievalToolkit) {
        let embedder = Arc::new(embedder);
        let retriever = SemanticRetriever::new(embedder.clone());
        retriever.install(unit_destinations());
        retriever.install(experiences());
        (embedder, RetrievalToolkit::new(Arc::new(retriever)))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::toolkit;
    use super::*;
    use crate::embedding::testing::ScriptedEmbedder;

    fn ids(docs: &[Document], kind: CollectionKind) -> Vec<&str> {
        docs.iter().map(|d| field_str(d, kind.id_field()).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_destination_default_top_k_is_three() {
        let (_, toolkit) =
            toolkit(ScriptedEmbedder::new(5).with("beach", vec![0.5, 0.4, 0.3, 0.2, 0.1]));
        let docs = toolkit
            .search_destinations(DestinationQuery::from_parts(Some("beach".into()), None, None).unwrap())
            .await
            .unwrap();
        assert_eq!(ids(&docs, CollectionKind::Destination), vec!["D1", "D2", "D3"]);
    }

    #[tokio::test]
    async fn test_destination_lookup_nonexistent_is_empty() {
        let (embedder, toolkit) = toolkit(ScriptedEmbedder::new(5));
        let docs = toolkit
            .search_destinations(DestinationQuery::lookup(["nonexistent"]))
            .await
            .unwrap();
        assert!(docs.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_destination_requires_a_mode() {
        assert!(matches!(
            DestinationQuery::from_parts(None, None, None),
            Err(RoamerError::InvalidCall(_))
        ));
        assert_eq!(
            DestinationQuery::from_parts(Some("alps".into()), None, None).unwrap(),
            DestinationQuery::Semantic {
                query: "alps".into(),
                top_k: 3
            }
        );
    }

    #[tokio::test]
    async fn test_experiences_scoped_to_destination() {
        let (_, toolkit) = toolkit(ScriptedEmbedder::new(3).with("X", vec![0.3, 1.0, 0.0]));
        let docs = toolkit
            .search_experiences("X", Some("D1"), Some(7))
            .await
            .unwrap();
        // Only two D1 experiences exist; top_k=7 does not pad
        assert_eq!(ids(&docs, CollectionKind::Experience), vec!["E3", "E1"]);
    }

    #[tokio::test]
    async fn test_experiences_default_top_k_is_seven() {
        let (_, toolkit) = toolkit(ScriptedEmbedder::new(3).with("X", vec![1.0, 0.0, 0.0]));
        let hits = toolkit
            .search_experiences_scored("X", None, None)
            .await
            .unwrap();
        // Fixture holds five experiences, all ranked
        assert_eq!(hits.len(), 5);
        assert_eq!(toolkit.experience_top_k, 7);
        assert_eq!(
            field_str(&hits[0].document, "experience_id"),
            Some("E1")
        );
    }

    #[tokio::test]
    async fn test_config_overrides_defaults() {
        let (_, toolkit) = toolkit(
            ScriptedEmbedder::new(5)
                .with("q", vec![1.0, 1.0, 1.0, 1.0, 1.0])
                .with("food", vec![1.0, 0.0, 0.0]),
        );
        let toolkit = toolkit.with_config(&RetrievalConfig {
            destination_top_k: 1,
            experience_top_k: 2,
            ..RetrievalConfig::default()
        });
        let query = DestinationQuery::from_parts(Some("q".into()), None, Some(toolkit.destination_top_k()))
            .unwrap();
        let docs = toolkit.search_destinations(query).await.unwrap();
        assert_eq!(docs.len(), 1);

        let exps = toolkit.search_experiences("food", None, None).await.unwrap();
        assert_eq!(ids(&exps, CollectionKind::Experience), vec!["E1", "E2"]);
    }

    #[tokio::test]
    async fn test_provider_failure_is_distinct_from_empty() {
        let (_, toolkit) = toolkit(ScriptedEmbedder::new(3).failing_on("boom"));
        let result = toolkit.search_experiences("boom", None, None).await;
        assert!(matches!(result, Err(RoamerError::Provider(_))));
    }
}
