use crate::error::{Result, RoamerError};
use crate::index::builder::DEFAULT_EMBEDDED_FIELDS;
use crate::planner::PlannerLimits;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no API key is configured.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoamerConfig {
    /// Directory holding `destination_index.rmx` and `experience_index.rmx`.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub planner: PlannerLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Output dimension for the hashing embedder. Ignored by remote providers.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    #[default]
    Google,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_destination_top_k")]
    pub destination_top_k: usize,
    #[serde(default = "default_experience_top_k")]
    pub experience_top_k: usize,
    #[serde(default = "default_embedded_fields")]
    pub embedded_fields: Vec<String>,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("vector_indexes")
}

fn default_dimension() -> usize {
    256
}

fn default_batch_size() -> usize {
    100
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_destination_top_k() -> usize {
    3
}

fn default_experience_top_k() -> usize {
    7
}

fn default_embedded_fields() -> Vec<String> {
    DEFAULT_EMBEDDED_FIELDS.iter().map(|f| f.to_string()).collect()
}

impl Default for RoamerConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerLimits::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::default(),
            api_key: None,
            base_url: None,
            model: None,
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            destination_top_k: default_destination_top_k(),
            experience_top_k: default_experience_top_k(),
            embedded_fields: default_embedded_fields(),
        }
    }
}

impl RoamerConfig {
    /// Reject values that would make building or ranking meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(RoamerError::Configuration(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProviderType::Hashing && self.embedding.dimension == 0 {
            return Err(RoamerError::Configuration(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.retrieval.destination_top_k == 0 || self.retrieval.experience_top_k == 0 {
            return Err(RoamerError::Configuration(
                "retrieval top_k defaults must be at least 1".to_string(),
            ));
        }
        if self.retrieval.embedded_fields.is_empty() {
            return Err(RoamerError::Configuration(
                "retrieval.embedded_fields must name at least one field".to_string(),
            ));
        }
        self.planner.validate()
    }
}

pub struct ConfigManager {
    config: RoamerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load from the platform config directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::from_path(config_path)
    }

    /// Load from an explicit file. A missing file yields defaults plus env overrides.
    pub fn from_path(config_path: PathBuf) -> Result<Self> {
        let config = Self::load_or_default(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| RoamerError::Configuration(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.config_path, toml)
            .map_err(|e| RoamerError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> &RoamerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "roamer", "roamer").ok_or_else(|| {
            RoamerError::Configuration("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn load_or_default(path: &Path) -> Result<RoamerConfig> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("ROAMER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RoamerError::Configuration(format!("Failed to build config: {}", e)))?;

        let mut config: RoamerConfig = s.try_deserialize().map_err(|e| {
            RoamerError::Configuration(format!("Failed to deserialize config: {}", e))
        })?;

        if config.embedding.api_key.is_none() {
            config.embedding.api_key = std::env::var(GEMINI_API_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }
}
