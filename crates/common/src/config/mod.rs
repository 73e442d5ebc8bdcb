//! Configuration management for Chainsight
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::llm::ChatModel;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Chat completion configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval loop configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Primary model for generation-heavy calls
    #[serde(default = "default_primary_model")]
    pub primary_model: ChatModel,

    /// Fallback model, invoked once after the primary exhausts retries
    #[serde(default = "default_fallback_model")]
    pub fallback_model: ChatModel,

    /// Low-latency model for classification and expansion
    #[serde(default = "default_fast_model")]
    pub fast_model: ChatModel,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// Anthropic API key
    pub anthropic_api_key: Option<String>,

    /// OpenAI-compatible base URL override
    pub openai_api_base: Option<String>,

    /// Anthropic base URL override
    pub anthropic_api_base: Option<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Retries after the first primary attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base in seconds; delay before retry n is
    /// base^(n-1)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: f64,

    /// Maximum concurrent in-flight calls in a dispatched batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries inside the embedding client
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Maximum inputs per embedding API request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Index API key
    pub api_key: Option<String>,

    /// Index host URL (e.g. https://my-index-abc123.svc.pinecone.io)
    pub host: Option<String>,

    /// Namespace within the index
    #[serde(default)]
    pub namespace: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Nearest-neighbor matches requested per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity score for a chunk to be retained
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum refinement iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Below this many chunks the search requests refinement
    #[serde(default = "default_min_sufficient_chunks")]
    pub min_sufficient_chunks: usize,

    /// Chunks passed to answer generation, capped to preserve
    /// reasoning quality on long contexts
    #[serde(default = "default_max_answer_chunks")]
    pub max_answer_chunks: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

// Default value functions
fn default_primary_model() -> ChatModel {
    ChatModel::Gpt5
}
fn default_fallback_model() -> ChatModel {
    ChatModel::ClaudeSonnet
}
fn default_fast_model() -> ChatModel {
    ChatModel::ClaudeHaiku
}
fn default_call_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> f64 {
    2.0
}
fn default_max_concurrent() -> usize {
    10
}
fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_embedding_dimension() -> usize {
    3072
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_embedding_batch_size() -> usize {
    2048
}
fn default_index_timeout() -> u64 {
    30
}
fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.45
}
fn default_max_iterations() -> u32 {
    3
}
fn default_min_sufficient_chunks() -> usize {
    3
}
fn default_max_answer_chunks() -> usize {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=20
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            fast_model: default_fast_model(),
            openai_api_key: None,
            anthropic_api_key: None,
            openai_api_base: None,
            anthropic_api_base: None,
            call_timeout_secs: default_call_timeout(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: None,
            namespace: String::new(),
            timeout_secs: default_index_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            max_iterations: default_max_iterations(),
            min_sufficient_chunks: default_min_sufficient_chunks(),
            max_answer_chunks: default_max_answer_chunks(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.max_iterations, 3);
        assert_eq!(config.retrieval.min_sufficient_chunks, 3);
        assert_eq!(config.retrieval.max_answer_chunks, 15);
        assert!((config.retrieval.similarity_threshold - 0.45).abs() < f32::EPSILON);
        assert_eq!(config.embedding.model, "text-embedding-3-large");
        assert_eq!(config.embedding.dimension, 3072);
    }

    #[test]
    fn test_default_models() {
        let config = AppConfig::default();
        assert_eq!(config.llm.primary_model, ChatModel::Gpt5);
        assert_eq!(config.llm.fallback_model, ChatModel::ClaudeSonnet);
        assert_eq!(config.llm.max_concurrent, 10);
    }
}
