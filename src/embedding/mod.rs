//! Dense and sparse text embedding
//!
//! Every chunk is stored with two vectors:
//! - a dense vector from a [`DenseEmbedder`] (`FastEmbedProvider`, or the
//!   offline `HashingEmbedder`), compared by cosine similarity
//! - a sparse vector from a [`SparseEmbedder`] (`Bm25Embedder`), compared by
//!   weighted term overlap
//!
//! The query side uses the same embedders so both channels live in the same
//! vector spaces as the stored records.

mod hashing;
mod provider;
mod sparse;

pub use hashing::HashingEmbedder;
pub use provider::FastEmbedProvider;
pub use sparse::Bm25Embedder;

use crate::config::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Name of the offline dense model in `embedding.dense_model`
pub const HASHING_MODEL: &str = "hashing";

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Generation failures may be transient; everything else is permanent
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::GenerationError(_))
    }
}

/// Fixed-length semantic embedder
pub trait DenseEmbedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Output dimension. May embed a probe text on first call.
    fn dimension(&self) -> Result<usize, EmbeddingError>;

    fn model_name(&self) -> &str;
}

/// Lexical term-weight embedder
pub trait SparseEmbedder: Send + Sync {
    /// Embed document text for storage
    fn embed(&self, text: &str) -> Result<SparseVector, EmbeddingError>;

    /// Embed query text. Defaults to the document encoding.
    fn embed_query(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        self.embed(text)
    }

    fn model_name(&self) -> &str;
}

/// Index/weight pairs sorted by index, indices unique
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from unordered pairs, summing duplicate indices
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(index, _)| *index);

        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f32> = Vec::with_capacity(pairs.len());
        for (index, value) in pairs {
            if indices.last() == Some(&index) {
                if let Some(last) = values.last_mut() {
                    *last += value;
                }
            } else {
                indices.push(index);
                values.push(value);
            }
        }

        Self { indices, values }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Check structural invariants: equal lengths, strictly increasing
    /// indices, finite non-negative weights
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() != self.values.len() {
            return Err(format!(
                "{} indices but {} values",
                self.indices.len(),
                self.values.len()
            ));
        }
        if let Some(pair) = self.indices.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!(
                "indices must be strictly increasing, found {} before {}",
                pair[0], pair[1]
            ));
        }
        if let Some(value) = self.values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(format!("invalid weight {}", value));
        }
        Ok(())
    }

    /// Sparse dot product; both sides must be sorted
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Build the dense embedder named by `config.dense_model`
pub fn dense_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn DenseEmbedder>, EmbeddingError> {
    if config.dense_model == HASHING_MODEL {
        return Ok(Arc::new(HashingEmbedder::new(config.hashing_dim)?));
    }
    Ok(Arc::new(FastEmbedProvider::new(&config.dense_model)?))
}

/// Build the sparse embedder from `config.bm25`
pub fn sparse_from_config(config: &EmbeddingConfig) -> Arc<dyn SparseEmbedder> {
    Arc::new(Bm25Embedder::new(config.bm25))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_sorts_and_merges() {
        let vector = SparseVector::from_pairs(vec![(7, 1.0), (2, 0.5), (7, 0.25)]);

        assert_eq!(vector.indices, vec![2, 7]);
        assert_eq!(vector.values, vec![0.5, 1.25]);
        assert!(vector.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let mismatched = SparseVector {
            indices: vec![1, 2],
            values: vec![1.0],
        };
        assert!(mismatched.validate().is_err());

        let unsorted = SparseVector {
            indices: vec![3, 1],
            values: vec![1.0, 1.0],
        };
        assert!(unsorted.validate().is_err());

        let negative = SparseVector {
            indices: vec![1],
            values: vec![-0.5],
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_dot() {
        let a = SparseVector::from_pairs(vec![(1, 2.0), (3, 1.0), (5, 4.0)]);
        let b = SparseVector::from_pairs(vec![(3, 3.0), (5, 0.5), (9, 10.0)]);

        assert_eq!(a.dot(&b), 5.0);
        assert_eq!(a.dot(&SparseVector::default()), 0.0);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EmbeddingError::GenerationError("timeout".to_string()).is_retryable());
        assert!(!EmbeddingError::InvalidInput("empty".to_string()).is_retryable());
        assert!(!EmbeddingError::DimensionMismatch {
            expected: 384,
            actual: 768
        }
        .is_retryable());
    }

    #[test]
    fn test_hashing_model_from_config() {
        let config = EmbeddingConfig {
            dense_model: HASHING_MODEL.to_string(),
            hashing_dim: 64,
            ..EmbeddingConfig::default()
        };

        let dense = dense_from_config(&config).unwrap();
        assert_eq!(dense.dimension().unwrap(), 64);
        assert_eq!(dense.model_name(), HASHING_MODEL);
    }
}
