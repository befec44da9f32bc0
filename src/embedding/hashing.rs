//! Offline dense embedder based on feature hashing

use super::sparse::{term_index, TermAnalyzer};
use super::{DenseEmbedder, EmbeddingError, HASHING_MODEL};

/// Deterministic bag-of-words embedder.
///
/// Each analyzed term is hashed to a slot and a sign, and the resulting
/// vector is L2-normalised. Texts sharing vocabulary land close together in
/// cosine space. Needs no model download, so it serves offline use and tests.
#[derive(Clone)]
pub struct HashingEmbedder {
    analyzer: TermAnalyzer,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Hashing dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            analyzer: TermAnalyzer::plain(),
            dimension,
        })
    }
}

impl DenseEmbedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut terms = self.analyzer.terms(trimmed);
        if terms.is_empty() {
            // Punctuation-only input still gets a stable direction
            terms.push(trimmed.to_string());
        }

        let mut vector = vec![0f32; self.dimension];
        for term in &terms {
            let hash = term_index(term);
            let slot = hash as usize % self.dimension;
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> Result<usize, EmbeddingError> {
        Ok(self.dimension)
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL
    }
}
