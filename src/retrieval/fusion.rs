//! Reciprocal Rank Fusion for combining the dense and sparse rankings

use ahash::AHashMap;
use std::hash::Hash;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,

    #[error("Invalid RRF constant {0}: must be positive")]
    InvalidRrfK(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for the dense channel
    pub dense_weight: f32,

    /// Weight for the sparse channel
    pub sparse_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, dense_weight: f32, sparse_weight: f32) -> Result<Self, FusionError> {
        if !(dense_weight > 0.0 && sparse_weight > 0.0) {
            return Err(FusionError::InvalidWeights);
        }
        if !(rrf_k > 0.0) {
            return Err(FusionError::InvalidRrfK(rrf_k));
        }

        Ok(Self {
            rrf_k,
            dense_weight,
            sparse_weight,
        })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            dense_weight: 1.0,
            sparse_weight: 1.0,
        }
    }
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(key) = sum over both rankings of: weight / (k + rank),
/// with 1-based ranks.
///
/// Returns `(key, fused_score)` pairs sorted by score descending. Equal
/// scores keep first-seen order, dense list before sparse list.
pub fn reciprocal_rank_fusion<K>(dense: &[K], sparse: &[K], config: &FusionConfig) -> Vec<(K, f32)>
where
    K: Eq + Hash + Clone,
{
    let mut positions: AHashMap<K, usize> = AHashMap::new();
    let mut fused: Vec<(K, f32)> = Vec::with_capacity(dense.len() + sparse.len());

    for (ranking, weight) in [(dense, config.dense_weight), (sparse, config.sparse_weight)] {
        for (rank, key) in ranking.iter().enumerate() {
            let rrf_score = weight / (config.rrf_k + rank as f32 + 1.0);
            match positions.get(key) {
                Some(&i) => fused[i].1 += rrf_score,
                None => {
                    positions.insert(key.clone(), fused.len());
                    fused.push((key.clone(), rrf_score));
                }
            }
        }
    }

    // Stable sort keeps first-seen order for ties
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));

    fused
}
