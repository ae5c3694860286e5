use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Result, StrataError};

/// Main configuration structure for Strata
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Hot buffer and retrieval configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Model profiles for each routing tier
    #[serde(default)]
    pub router: RouterConfig,
    /// Backend transport configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector index locations (warm/cold tiers)
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background archival retry policy
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Static knowledge cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Built-in plugin toggles
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists. Falls back to defaults when nothing is found.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(&path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
            dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.memory.hot_token_ceiling > self.memory.hot_token_budget {
            return Err(StrataError::Config(format!(
                "memory.hot_token_ceiling ({}) exceeds memory.hot_token_budget ({})",
                self.memory.hot_token_ceiling, self.memory.hot_token_budget
            )));
        }
        if self.archive.max_attempts == 0 {
            return Err(StrataError::Config(
                "archive.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(StrataError::Config(
                "embedding.dimension must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hot buffer and context assembly configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Total token budget of the hot buffer
    #[serde(default = "default_hot_token_budget")]
    pub hot_token_budget: usize,
    /// Estimated token count that triggers summarization
    #[serde(default = "default_hot_token_ceiling")]
    pub hot_token_ceiling: usize,
    /// Exchanges kept verbatim after a summarization cycle
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Maximum exchanges read from the hot tier per query
    #[serde(default = "default_hot_history_turns")]
    pub hot_history_turns: usize,
    /// Warm tier results per query
    #[serde(default = "default_warm_results")]
    pub warm_results: usize,
    /// Cold tier results per query
    #[serde(default = "default_cold_results")]
    pub cold_results: usize,
    /// Maximum entries returned by a session history lookup
    #[serde(default = "default_session_history_limit")]
    pub session_history_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            hot_token_budget: default_hot_token_budget(),
            hot_token_ceiling: default_hot_token_ceiling(),
            keep_recent: default_keep_recent(),
            hot_history_turns: default_hot_history_turns(),
            warm_results: default_warm_results(),
            cold_results: default_cold_results(),
            session_history_limit: default_session_history_limit(),
        }
    }
}

fn default_hot_token_budget() -> usize {
    100_000
}

fn default_hot_token_ceiling() -> usize {
    80_000
}

fn default_keep_recent() -> usize {
    10
}

fn default_hot_history_turns() -> usize {
    20
}

fn default_warm_results() -> usize {
    3
}

fn default_cold_results() -> usize {
    2
}

fn default_session_history_limit() -> usize {
    50
}

/// Settings for a single backend model invocation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the backend
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token budget
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_output_tokens,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    8192
}

/// Model profiles used by the router, classifier and summarizer
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Low-cost model used to classify queries
    #[serde(default = "default_classifier_model")]
    pub classifier: ModelConfig,
    /// Fastest/cheapest tier
    #[serde(default = "default_fast_model")]
    pub fast: ModelConfig,
    /// Default tier
    #[serde(default = "default_balanced_model")]
    pub balanced: ModelConfig,
    /// Deep-reasoning tier
    #[serde(default = "default_deep_model")]
    pub deep: ModelConfig,
    /// Model used to compact the hot buffer and by the auto summarizer
    #[serde(default = "default_summarizer_model")]
    pub summarizer: ModelConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            classifier: default_classifier_model(),
            fast: default_fast_model(),
            balanced: default_balanced_model(),
            deep: default_deep_model(),
            summarizer: default_summarizer_model(),
        }
    }
}

fn default_classifier_model() -> ModelConfig {
    ModelConfig::new("gpt-4o-mini", 0.0, 256)
}

fn default_fast_model() -> ModelConfig {
    ModelConfig::new("gpt-4o-mini", 0.7, 8192)
}

fn default_balanced_model() -> ModelConfig {
    ModelConfig::new("gpt-4o", 0.7, 8192)
}

fn default_deep_model() -> ModelConfig {
    ModelConfig::new("gpt-4.1", 0.3, 32768)
}

fn default_summarizer_model() -> ModelConfig {
    ModelConfig::new("gpt-4o-mini", 0.3, 2048)
}

/// OpenAI-compatible backend transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// API base URL (`/chat/completions` is appended)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "STRATA_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// fastembed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimension; every warm/cold entry must match it
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

/// Vector index locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all index data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Table backing the warm tier
    #[serde(default = "default_warm_table")]
    pub warm_table: String,
    /// Table backing the cold tier
    #[serde(default = "default_cold_table")]
    pub cold_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            warm_table: default_warm_table(),
            cold_table: default_cold_table(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".strata"))
        .unwrap_or_else(|| PathBuf::from(".strata"))
}

fn default_warm_table() -> String {
    "conversation_memory".to_string()
}

fn default_cold_table() -> String {
    "long_term_memory".to_string()
}

/// Retry policy for background tier writes
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Attempts per write before it is dropped (at least 2 retries once)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Static knowledge cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Record lifetime in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// Maximum number of cache records
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    3_600_000
}

fn default_cache_capacity() -> usize {
    64
}

/// Built-in plugin toggles
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Record per-query cost statistics
    #[serde(default = "default_cost_tracker")]
    pub cost_tracker: bool,
    /// Attach a sentiment score to every result
    #[serde(default)]
    pub sentiment: bool,
    /// Message-count based summarization of archived text
    #[serde(default)]
    pub auto_summarizer: AutoSummarizerConfig,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            cost_tracker: default_cost_tracker(),
            sentiment: false,
            auto_summarizer: AutoSummarizerConfig::default(),
        }
    }
}

fn default_cost_tracker() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoSummarizerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Saves between summaries
    #[serde(default = "default_summary_interval")]
    pub interval: usize,
}

impl Default for AutoSummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_summary_interval(),
        }
    }
}

fn default_summary_interval() -> usize {
    20
}
