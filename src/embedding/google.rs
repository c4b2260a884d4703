use crate::config::EmbeddingConfig;
use crate::embedding::retry::retry_with_backoff;
use crate::embedding::{Embedder, TaskType};
use crate::error::{Result, RoamerError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Gemini embedding client (`embedContent` / `batchEmbedContents`).
pub struct GoogleEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
    max_retries: u32,
}

impl GoogleEmbedder {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &'static str = "text-embedding-004";

    const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);

    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RoamerError::Configuration(
                    "Gemini API key not configured (set GEMINI_API_KEY or embedding.api_key)"
                        .to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RoamerError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            client,
            max_retries: config.max_retries,
        })
    }

    /// `models/<id>`, accepting either form in config.
    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn content_request(&self, text: &str, task: TaskType) -> Value {
        json!({
            "model": self.model_path(),
            "content": { "parts": [{ "text": text }] },
            "taskType": task.as_wire(),
        })
    }

    async fn post(&self, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}:{}", self.base_url, self.model_path(), method);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RoamerError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

fn parse_values(embedding: &Value) -> Result<Vec<f32>> {
    let values = embedding["values"].as_array().ok_or_else(|| {
        RoamerError::Provider("Gemini response missing embedding values".to_string())
    })?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RoamerError::Provider("Non-numeric embedding value".to_string()))
        })
        .collect()
}

/// Parse an `embedContent` response body.
pub(crate) fn parse_single_response(data: &Value) -> Result<Vec<f32>> {
    parse_values(&data["embedding"])
}

/// Parse a `batchEmbedContents` response body, checking the count.
pub(crate) fn parse_batch_response(data: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let embeddings = data["embeddings"].as_array().ok_or_else(|| {
        RoamerError::Provider("Gemini response missing embeddings array".to_string())
    })?;

    if embeddings.len() != expected {
        return Err(RoamerError::Provider(format!(
            "Gemini returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    embeddings.iter().map(parse_values).collect()
}

#[async_trait]
impl Embedder for GoogleEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        let body = self.content_request(text, task);
        let data = retry_with_backoff(self.max_retries, Self::INITIAL_RETRY_DELAY, || {
            self.post("embedContent", &body)
        })
        .await?;

        parse_single_response(&data)
    }

    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Value> = texts
            .iter()
            .map(|t| self.content_request(t, task))
            .collect();
        let body = json!({ "requests": requests });

        debug!(count = texts.len(), task = task.as_wire(), "Requesting batch embeddings");

        let data = retry_with_backoff(self.max_retries, Self::INITIAL_RETRY_DELAY, || {
            self.post("batchEmbedContents", &body)
        })
        .await?;

        parse_batch_response(&data, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(model: Option<&str>) -> GoogleEmbedder {
        let config = EmbeddingConfig {
            api_key: Some("test-key".to_string()),
            model: model.map(|m| m.to_string()),
            base_url: Some("http://localhost:9/v1beta/".to_string()),
            ..EmbeddingConfig::default()
        };
        GoogleEmbedder::new(&config).unwrap()
    }

    #[test]
    fn test_blank_key_is_configuration_error() {
        let config = EmbeddingConfig {
            api_key: Some("   ".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            GoogleEmbedder::new(&config),
            Err(RoamerError::Configuration(_))
        ));
    }

    #[test]
    fn test_model_path_normalization() {
        assert_eq!(embedder(None).model_path(), "models/text-embedding-004");
        assert_eq!(
            embedder(Some("models/gemini-embedding-001")).model_path(),
            "models/gemini-embedding-001"
        );
        assert_eq!(embedder(None).base_url, "http://localhost:9/v1beta");
    }

    #[test]
    fn test_request_carries_task_type() {
        let body = embedder(None).content_request("beach towns", TaskType::Query);
        assert_eq!(body["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(body["content"]["parts"][0]["text"], "beach towns");
        assert_eq!(body["model"], "models/text-embedding-004");
    }

    #[test]
    fn test_parse_single_response() {
        let data = json!({ "embedding": { "values": [0.25, -0.5, 1.0] } });
        assert_eq!(parse_single_response(&data).unwrap(), vec![0.25, -0.5, 1.0]);

        let bad = json!({ "embedding": {} });
        assert!(matches!(parse_single_response(&bad), Err(RoamerError::Provider(_))));
    }

    #[test]
    fn test_parse_batch_response_checks_count() {
        let data = json!({
            "embeddings": [
                { "values": [1.0, 0.0] },
                { "values": [0.0, 1.0] }
            ]
        });
        let parsed = parse_batch_response(&data, 2).unwrap();
        assert_eq!(parsed, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        assert!(matches!(
            parse_batch_response(&data, 3),
            Err(RoamerError::Provider(_))
        ));
    }
}
