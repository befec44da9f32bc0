//! FastEmbed dense embedder
use super::{DenseEmbedder, EmbeddingError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, OnceLock};

const PROBE_TEXT: &str = "dimension probe";

/// Local ONNX dense embedder
///
/// Models are downloaded on first use to the fastembed cache. The output
/// dimension is learned by embedding a probe text once and is then enforced
/// on every later embedding.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: OnceLock<usize>,
}

impl FastEmbedProvider {
    /// Supported models:
    /// - all-MiniLM-L6-v2: ~90MB
    /// - bge-small-en-v1.5: ~130MB
    /// - bge-base-en-v1.5: ~440MB
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, hashing",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing dense model: {} (~{}MB download if not cached)",
            model_name,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension: OnceLock::new(),
        })
    }

    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }
}

impl DenseEmbedder for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self.embed_raw(text)?;
        let expected = self.dimension()?;

        if embedding.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> Result<usize, EmbeddingError> {
        if let Some(dimension) = self.dimension.get() {
            return Ok(*dimension);
        }

        let dimension = self.embed_raw(PROBE_TEXT)?.len();
        tracing::debug!("Probed {} dimension: {}", self.model_name, dimension);
        Ok(*self.dimension.get_or_init(|| dimension))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
