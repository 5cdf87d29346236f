use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemosConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub timeouts: TimeoutConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `memos.db`, `vectors.db` and `graph.db`.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"hashing"` (built-in, deterministic) or `"remote"` (OpenAI-compatible HTTP).
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    /// Base URL for the remote provider, e.g. `http://localhost:11434/v1`.
    pub endpoint: Option<String>,
    /// Name of the env var holding the bearer token for the remote provider.
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub score_threshold: f32,
    pub tool_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub namespace: String,
    pub max_entries: u64,
    pub embedding_ttl_secs: u64,
    pub query_ttl_secs: u64,
    pub tool_search_ttl_secs: u64,
    pub working_memory_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embedding_ms: u64,
    pub structured_ms: u64,
    pub vector_ms: u64,
    pub graph_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_content_bytes: usize,
    pub max_metadata_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8091,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_memos_dir().to_string_lossy().into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".into(),
            model: "feature-hash-v1".into(),
            dimensions: 384,
            endpoint: None,
            api_key_env: "MEMOS_EMBEDDING_API_KEY".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 100,
            score_threshold: 0.1,
            tool_limit: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "memos".into(),
            max_entries: 10_000,
            embedding_ttl_secs: 3600,
            query_ttl_secs: 1800,
            tool_search_ttl_secs: 7200,
            working_memory_ttl_secs: 300,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_ms: 5000,
            structured_ms: 5000,
            vector_ms: 5000,
            graph_ms: 5000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: 1024 * 1024,
            max_metadata_bytes: 64 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }

    pub fn tool_search_ttl(&self) -> Duration {
        Duration::from_secs(self.tool_search_ttl_secs)
    }

    pub fn working_memory_ttl(&self) -> Duration {
        Duration::from_secs(self.working_memory_ttl_secs)
    }
}

/// Returns `~/.memos/`
pub fn default_memos_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memos")
}

/// Returns the default config file path: `~/.memos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memos_dir().join("config.toml")
}

impl MemosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemosConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMOS_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MEMOS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMOS_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("MEMOS_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(val);
        }
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Structured store: memories and the tool registry.
    pub fn structured_db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("memos.db")
    }

    pub fn vector_db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("vectors.db")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("graph.db")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}
