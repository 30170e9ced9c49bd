//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//! - Legacy key names from older deployments (`mistral_api_key`, `log_level`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::rotating_file::{RotationPolicy, RotationType};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Legacy top-level log level, folded into `logging.level` on load
    #[serde(default, skip_serializing)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// HTTP server configuration (health and inspection API)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Disable to run the bot without the HTTP listener
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_server_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enabled: default_server_enabled(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "sqlite://main.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Filesystem path of the SQLite database, if the URL points at a file
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        let rest = self.url.strip_prefix("sqlite://")?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix, the session start timestamp is appended
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// File rotation trigger
    #[serde(default)]
    pub rotation: RotationType,
    /// Rotation amount: "10 mb", "1 day" or "1 day|10 mb" for time_size
    #[serde(default)]
    pub rotation_amount: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console only
    Console,
    /// Log to rotating files only
    File,
    /// Log to both console and file
    #[default]
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_prefix() -> String {
    "network".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            rotation: RotationType::default(),
            rotation_amount: None,
        }
    }
}

impl LoggingConfig {
    /// Build the rotation policy for the file sink
    pub fn rotation_policy(&self) -> Result<RotationPolicy> {
        RotationPolicy::parse(self.rotation, self.rotation_amount.as_deref())
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Bot API token (legacy name: `api_key`), may come from `TELEGRAM_BOT_TOKEN` instead
    #[serde(default, alias = "api_key")]
    pub token: String,
    #[serde(default = "default_bot_api_url")]
    pub api_url: String,
    /// Long polling timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Channels shown per page in the removal menu
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_items_per_page() -> usize {
    5
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_bot_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            items_per_page: default_items_per_page(),
        }
    }
}

/// Channel scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Number of historical posts fetched when a channel is first subscribed
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Interval between checks for new posts
    #[serde(default = "default_scrape_interval")]
    pub poll_interval_secs: u64,
    /// Base URL of the public channel preview site
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_history_limit() -> usize {
    100
}

fn default_scrape_interval() -> u64 {
    60
}

fn default_feed_url() -> String {
    "https://t.me".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            poll_interval_secs: default_scrape_interval(),
            feed_url: default_feed_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RagConfig {
    /// Nearest chunks retrieved per channel
    #[serde(default = "default_n_result")]
    pub n_result: usize,
    /// Maximum chunk length in characters
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Questions answered concurrently
    #[serde(default = "default_query_concurrency")]
    pub query_concurrency: usize,
    /// Capacity of the internal message and request queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_n_result() -> usize {
    5
}

fn default_max_chunk_size() -> usize {
    512
}

fn default_query_concurrency() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            n_result: default_n_result(),
            max_chunk_size: default_max_chunk_size(),
            query_concurrency: default_query_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Vector store backend
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// In-process store persisted as JSON under `data_dir`
    #[default]
    Local,
    /// Remote Chroma server
    Chroma,
}

/// Vector store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_chroma_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    /// Persistence directory for the local backend
    #[serde(default = "default_vector_dir")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_chroma_port() -> u16 {
    8000
}

fn default_vector_dir() -> Option<PathBuf> {
    Some(PathBuf::from("chroma_db"))
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            host: None,
            port: default_chroma_port(),
            ssl: false,
            data_dir: default_vector_dir(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl VectorStoreConfig {
    /// Base URL of the Chroma server
    pub fn chroma_url(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        let scheme = if self.ssl { "https" } else { "http" };
        Some(format!("{}://{}:{}", scheme, host, self.port))
    }
}

/// Embedding provider
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local feature hashing, no network access
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
}

/// Embedding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    /// Model name (legacy name: `sentence_transformer_model`)
    #[serde(default = "default_embedding_model", alias = "sentence_transformer_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dims() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            base_url: default_llm_url(),
            api_key: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Chat completion provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default, alias = "mistral_api_key")]
    pub api_key: String,
    #[serde(default = "default_llm_model", alias = "mistral_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "mistralai/mistral-7b-instruct".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            log_level: None,
            bot: BotConfig::default(),
            scraper: ScraperConfig::default(),
            rag: RagConfig::default(),
            vector_store: VectorStoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let config = Self::load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validating it
    pub fn load_unvalidated() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("TELERAG_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a configuration file without applying overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: AppConfig = serde_norway::from_str(yaml)?;
        if let Some(level) = config.log_level.take() {
            config.logging.level = level.to_lowercase();
        }
        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/telerag/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("telerag/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TELERAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TELERAG_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("TELERAG_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Some(target) = lookup("TELERAG_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "console" => LogTarget::Console,
                "file" => LogTarget::File,
                _ => LogTarget::Both,
            };
        }
        if let Some(dir) = lookup("TELERAG_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }

        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.bot.token = token;
        }

        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = lookup("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }

        if let Some(host) = lookup("CHROMA_HOST") {
            self.vector_store.backend = VectorBackend::Chroma;
            self.vector_store.host = Some(host);
        }
        if let Some(port) = lookup("CHROMA_PORT") {
            if let Ok(p) = port.parse() {
                self.vector_store.port = p;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bot.token.trim().is_empty() {
            anyhow::bail!("Telegram bot token is not configured (bot.token or TELEGRAM_BOT_TOKEN)");
        }

        if self.bot.items_per_page == 0 {
            anyhow::bail!("bot.items_per_page must be greater than zero");
        }

        if self.rag.n_result == 0 {
            anyhow::bail!("rag.n_result must be greater than zero");
        }

        if self.rag.max_chunk_size == 0 {
            anyhow::bail!("rag.max_chunk_size must be greater than zero");
        }

        if self.rag.query_concurrency == 0 || self.rag.queue_capacity == 0 {
            anyhow::bail!("rag.query_concurrency and rag.queue_capacity must be greater than zero");
        }

        if self.vector_store.backend == VectorBackend::Chroma && self.vector_store.host.is_none() {
            anyhow::bail!("vector_store.host is required for the chroma backend");
        }

        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be greater than zero");
        }

        if self.embedding.provider == EmbeddingProvider::Openai
            && self.embedding.api_key.as_deref().unwrap_or("").is_empty()
        {
            anyhow::bail!("embedding.api_key is required for the openai embedding provider");
        }

        if self.llm.api_key.is_empty() {
            tracing::warn!("llm.api_key is empty, answer generation requests will likely be rejected");
        }

        self.logging
            .rotation_policy()
            .context("Invalid logging rotation settings")?;

        Ok(())
    }
}
