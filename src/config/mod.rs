//! Configuration management for hybrid-rag
//!
//! Every core component takes its section of [`Config`] by value in its
//! constructor. Environment overrides are applied only by [`Config::load`].

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Prefix of environment overrides, e.g. `HYBRID_RAG_SEARCH__LIMIT=5`
pub const ENV_PREFIX: &str = "HYBRID_RAG_";

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub insert: InsertConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: current_timestamp(),
            last_modified: current_timestamp(),
        }
    }
}

/// Embedded vector store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file; `~` is expanded
    pub path: PathBuf,
    pub pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.hybrid-rag/store.db"),
            pool_size: 8,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_path(&self.path)
    }
}

/// Target collection and the names of its two vector slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub name: String,
    pub dense_vector: String,
    pub sparse_vector: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "rag_collection".to_string(),
            dense_vector: "text-dense".to_string(),
            sparse_vector: "text-sparse".to_string(),
        }
    }
}

/// Embedding models
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// fastembed model name, or `hashing` for the offline hashing embedder
    pub dense_model: String,
    /// Dimension of the hashing embedder
    pub hashing_dim: usize,
    pub bm25: Bm25Config,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dense_model: "all-MiniLM-L6-v2".to_string(),
            hashing_dim: 384,
            bm25: Bm25Config::default(),
        }
    }
}

/// BM25 term weighting of the sparse embedder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
    /// Expected document length in terms
    pub avg_len: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_len: 256.0,
        }
    }
}

/// Chunk window size and overlap, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Hybrid query parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of fused results returned per query
    pub limit: usize,
    /// Reciprocal rank fusion constant
    pub rrf_k: f32,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    /// Each channel prefetches `limit * prefetch_multiplier` candidates
    pub prefetch_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            rrf_k: 60.0,
            dense_weight: 1.0,
            sparse_weight: 1.0,
            prefetch_multiplier: 4,
        }
    }
}

/// Batch insert behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertConfig {
    /// Embedding worker threads
    pub concurrency: usize,
    /// Wait for the write to be durable before returning
    pub wait: bool,
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            wait: true,
        }
    }
}

impl Config {
    /// Load configuration from a file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HYBRID_RAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `(name, value)` overrides; names without the prefix are ignored
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, value.as_ref()) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORE__PATH" => self.store.path = PathBuf::from(value),
            "STORE__POOL_SIZE" => self.store.pool_size = parse_value(path, value)?,
            "COLLECTION__NAME" => self.collection.name = value.to_string(),
            "COLLECTION__DENSE_VECTOR" => self.collection.dense_vector = value.to_string(),
            "COLLECTION__SPARSE_VECTOR" => self.collection.sparse_vector = value.to_string(),
            "EMBEDDING__DENSE_MODEL" => self.embedding.dense_model = value.to_string(),
            "EMBEDDING__HASHING_DIM" => self.embedding.hashing_dim = parse_value(path, value)?,
            "EMBEDDING__BM25__K1" => self.embedding.bm25.k1 = parse_value(path, value)?,
            "EMBEDDING__BM25__B" => self.embedding.bm25.b = parse_value(path, value)?,
            "EMBEDDING__BM25__AVG_LEN" => self.embedding.bm25.avg_len = parse_value(path, value)?,
            "CHUNKING__CHUNK_SIZE" => self.chunking.chunk_size = parse_value(path, value)?,
            "CHUNKING__CHUNK_OVERLAP" => self.chunking.chunk_overlap = parse_value(path, value)?,
            "SEARCH__LIMIT" => self.search.limit = parse_value(path, value)?,
            "SEARCH__RRF_K" => self.search.rrf_k = parse_value(path, value)?,
            "SEARCH__DENSE_WEIGHT" => self.search.dense_weight = parse_value(path, value)?,
            "SEARCH__SPARSE_WEIGHT" => self.search.sparse_weight = parse_value(path, value)?,
            "SEARCH__PREFETCH_MULTIPLIER" => {
                self.search.prefetch_multiplier = parse_value(path, value)?
            }
            "INSERT__CONCURRENCY" => self.insert.concurrency = parse_value(path, value)?,
            "INSERT__WAIT" => self.insert.wait = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("hybrid-rag").join("config.toml"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RagError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
