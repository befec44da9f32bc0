//! Storage layer for hybrid-rag
//!
//! The vector index is reached through the [`VectorStore`] trait. It holds
//! named collections of points, each carrying one dense vector, one sparse
//! vector and a JSON payload. [`SqliteStore`] is the embedded implementation.
//! [`CollectionManager`] owns the collection lifecycle and
//! [`DocumentInserter`] turns chunks into points.

mod collection;
mod database;
mod inserter;

pub use collection::{CollectionManager, METADATA_INDEX_FIELDS};
pub use database::SqliteStore;
pub use inserter::DocumentInserter;

use crate::chunking::Headings;
use crate::embedding::SparseVector;
use crate::retrieval::FusionConfig;
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Field {field} has no payload index in collection {collection}")]
    UnindexedField { collection: String, field: String },

    #[error("Invalid filter key: {0}")]
    InvalidFilterKey(String),

    #[error("Invalid sparse vector: {0}")]
    InvalidSparseVector(String),

    #[error("Invalid collection schema: {0}")]
    InvalidSchema(String),

    #[error("Corrupt record in collection {collection}: {message}")]
    Corrupt { collection: String, message: String },

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

impl StoreError {
    /// Pool exhaustion and lock contention may clear up on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Pool(_) => true,
            StoreError::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, StoreError::DimensionMismatch { .. })
    }
}

/// Dense similarity metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseVectorParams {
    pub name: String,
    pub size: usize,
    pub distance: Distance,
}

/// Query-time weighting of sparse scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseModifier {
    None,
    /// Scale each query term by its inverse document frequency
    Idf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVectorParams {
    pub name: String,
    pub modifier: SparseModifier,
}

/// Vector spaces and payload indexes of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub dense: DenseVectorParams,
    pub sparse: SparseVectorParams,
    #[serde(default)]
    pub payload_indexes: Vec<String>,
}

impl CollectionSchema {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.dense.size == 0 {
            return Err(StoreError::InvalidSchema(
                "dense vector size must be greater than 0".to_string(),
            ));
        }
        if self.dense.name.is_empty() || self.sparse.name.is_empty() {
            return Err(StoreError::InvalidSchema(
                "vector names cannot be empty".to_string(),
            ));
        }
        if self.dense.name == self.sparse.name {
            return Err(StoreError::InvalidSchema(format!(
                "dense and sparse vectors share the name '{}'",
                self.dense.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: CollectionSchema,
    pub points_count: usize,
    pub created_at: DateTime<Utc>,
}

/// The two vectors stored with every point
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVectors {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

impl NamedVectors {
    pub fn new(dense: Vec<f32>, sparse: SparseVector) -> Self {
        Self { dense, sparse }
    }
}

/// Filterable data stored with a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub content: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: Headings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: Uuid,
    pub vectors: NamedVectors,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: Payload,
}

/// Exact match of one payload field, addressed by dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCondition {
    pub key: String,
    pub value: String,
}

impl FieldCondition {
    pub fn matches(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Conjunction of field conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub must: Vec<FieldCondition>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }
}

/// Query vectors; the variant selects the scoring channels
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVectors {
    /// Both channels ranked separately, then fused
    Hybrid { dense: Vec<f32>, sparse: SparseVector },
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub vectors: QueryVectors,
    pub filter: Option<Filter>,
    pub limit: usize,
    /// Candidates kept per channel before fusion
    pub prefetch_limit: usize,
    pub fusion: FusionConfig,
}

impl QueryRequest {
    pub fn new(vectors: QueryVectors, limit: usize) -> Self {
        Self {
            vectors,
            filter: None,
            limit,
            prefetch_limit: limit,
            fusion: FusionConfig::default(),
        }
    }

    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }

    pub fn with_prefetch_limit(mut self, prefetch_limit: usize) -> Self {
        self.prefetch_limit = prefetch_limit;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }
}

/// Vector index contract.
///
/// Implementations must be safe to share between threads; concurrent callers
/// are served in parallel.
pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError>;

    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Fails with `CollectionExists` when `name` is taken
    fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Drop a collection and its points. Returns whether it existed.
    fn delete_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Declare an equality index on a payload field
    fn create_payload_index(&self, name: &str, field: &str) -> Result<(), StoreError>;

    /// Write all points or none. With `wait`, the write is durable on return.
    fn upsert(&self, name: &str, points: Vec<PointRecord>, wait: bool) -> Result<usize, StoreError>;

    fn query(&self, name: &str, request: &QueryRequest) -> Result<Vec<ScoredPoint>, StoreError>;

    fn count(&self, name: &str) -> Result<usize, StoreError>;

    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CollectionSchema {
        CollectionSchema {
            dense: DenseVectorParams {
                name: "text-dense".to_string(),
                size: 8,
                distance: Distance::Cosine,
            },
            sparse: SparseVectorParams {
                name: "text-sparse".to_string(),
                modifier: SparseModifier::Idf,
            },
            payload_indexes: Vec::new(),
        }
    }

    #[test]
    fn test_schema_validation() {
        assert!(schema().validate().is_ok());

        let mut zero = schema();
        zero.dense.size = 0;
        assert!(zero.validate().is_err());

        let mut same = schema();
        same.sparse.name = same.dense.name.clone();
        assert!(same.validate().is_err());
    }

    #[test]
    fn test_schema_json_shape() {
        let json = serde_json::to_value(schema()).unwrap();
        assert_eq!(json["dense"]["distance"], "cosine");
        assert_eq!(json["sparse"]["modifier"], "idf");
    }

    #[test]
    fn test_payload_json_shape() {
        let mut metadata = Headings::default();
        metadata.header_2 = Some("Install".to_string());
        let payload = Payload {
            content: "apt install".to_string(),
            chunk_index: 4,
            metadata,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "content": "apt install",
                "chunk_index": 4,
                "metadata": { "header_2": "Install" }
            })
        );
    }

    #[test]
    fn test_error_classification() {
        let mismatch = StoreError::DimensionMismatch {
            collection: "docs".to_string(),
            expected: 384,
            actual: 768,
        };
        assert!(mismatch.is_dimension_mismatch());
        assert!(!mismatch.is_retryable());

        assert!(StoreError::Pool("timed out".to_string()).is_retryable());
        assert!(!StoreError::CollectionNotFound("docs".to_string()).is_retryable());
    }

    #[test]
    fn test_empty_filter_dropped() {
        let request = QueryRequest::new(QueryVectors::Dense(vec![1.0]), 3)
            .with_filter(Some(Filter::default()));
        assert!(request.filter.is_none());
    }
}
