#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable consulted when `[provider].api_key` is unset.
pub const API_KEY_ENV: &str = "RECALL_API_KEY";

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the external embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Optional inline credential; `RECALL_API_KEY` takes precedence.
    pub api_key: Option<String>,
    pub dimension: u32,
    pub batch_size: u32,
    pub batch_delay_ms: u64,
    pub max_input_tokens: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 20,
            batch_delay_ms: 100,
            max_input_tokens: 8000,
        }
    }
}

/// Score fusion weights for hybrid search. Provider-specific tuning knobs,
/// deliberately not hard-coded: switching embedding models changes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub keyword_candidate_limit: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            keyword_candidate_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Budget for assembled context, leaving headroom for the live query
    /// and the model's reply.
    pub max_context_tokens: usize,
    /// Cap on distinct conversations in multi-turn context.
    pub max_conversations: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 3000,
            max_conversations: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target character budget per conversation chunk.
    pub target_chunk_chars: usize,
    /// Minimum text length accepted by the embeddability gate.
    pub min_embeddable_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chunk_chars: 6000,
            min_embeddable_chars: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid fusion weight: {0} (must be between 0.0 and 1.0)")]
    InvalidFusionWeight(f32),
    #[error("Fusion weights must sum to 1.0, got {0}")]
    FusionWeightsNotNormalized(f32),
    #[error("Invalid keyword candidate limit: {0} (must be between 1 and 1000)")]
    InvalidCandidateLimit(u32),
    #[error("Invalid context token budget: {0} (must be between 100 and 100000)")]
    InvalidContextBudget(usize),
    #[error("Invalid conversation cap: {0} (must be between 1 and 100)")]
    InvalidConversationCap(usize),
    #[error("Invalid target chunk size: {0} (must be between 200 and 100000 chars)")]
    InvalidTargetChunkChars(usize),
    #[error("Invalid minimum embeddable length: {0} (must be between 1 and 1000)")]
    InvalidMinEmbeddableChars(usize),
    #[error("Invalid max input tokens: {0} (must be between 100 and 1000000)")]
    InvalidMaxInputTokens(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;
        self.fusion.validate()?;

        if !(100..=100_000).contains(&self.context.max_context_tokens) {
            return Err(ConfigError::InvalidContextBudget(
                self.context.max_context_tokens,
            ));
        }

        if !(1..=100).contains(&self.context.max_conversations) {
            return Err(ConfigError::InvalidConversationCap(
                self.context.max_conversations,
            ));
        }

        if !(200..=100_000).contains(&self.chunking.target_chunk_chars) {
            return Err(ConfigError::InvalidTargetChunkChars(
                self.chunking.target_chunk_chars,
            ));
        }

        if !(1..=1000).contains(&self.chunking.min_embeddable_chars) {
            return Err(ConfigError::InvalidMinEmbeddableChars(
                self.chunking.min_embeddable_chars,
            ));
        }

        Ok(())
    }

    /// Path for the SQLite database holding documents and embeddings.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("recall.db")
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            fusion: FusionConfig::default(),
            context: ContextConfig::default(),
            chunking: ChunkingConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(100..=1_000_000).contains(&self.max_input_tokens) {
            return Err(ConfigError::InvalidMaxInputTokens(self.max_input_tokens));
        }

        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    /// Resolve the provider credential, preferring the environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(ConfigError::InvalidFusionWeight(self.semantic_weight));
        }

        if !(0.0..=1.0).contains(&self.keyword_weight) {
            return Err(ConfigError::InvalidFusionWeight(self.keyword_weight));
        }

        let sum = self.semantic_weight + self.keyword_weight;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::FusionWeightsNotNormalized(sum));
        }

        if self.keyword_candidate_limit == 0 || self.keyword_candidate_limit > 1000 {
            return Err(ConfigError::InvalidCandidateLimit(
                self.keyword_candidate_limit,
            ));
        }

        Ok(())
    }
}
