use crate::cancel::Cancelled;
use crate::chunking::ChunkingError;
use crate::embedding::EmbeddingError;
use crate::retrieval::SearchError;
use crate::storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hybrid-rag
#[derive(Error, Debug)]
pub enum RagError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    /// Operation stopped by a cancel token or an expired deadline
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl RagError {
    /// True when repeating the same call may succeed (transient embedding or
    /// index connectivity failures). Dimension mismatches and input errors
    /// are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Embedding(e) => e.is_retryable(),
            RagError::Store(e) => e.is_retryable(),
            RagError::Search(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// True when the collection schema no longer matches the embedding model
    /// and the caller has to recreate the collection instead of retrying.
    pub fn requires_recreate(&self) -> bool {
        match self {
            RagError::Store(e) => e.is_dimension_mismatch(),
            RagError::Search(e) => e.requires_recreate(),
            _ => false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for hybrid-rag operations
pub type Result<T> = std::result::Result<T, RagError>;
