use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_store(config, &mut errors);
        Self::validate_collection(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_insert(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_store(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.store.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "store.path",
                "Store path cannot be empty",
            ));
        }

        if config.store.pool_size == 0 {
            errors.push(ValidationError::new(
                "store.pool_size",
                "Pool size must be greater than 0",
            ));
        }
    }

    fn validate_collection(config: &Config, errors: &mut Vec<ValidationError>) {
        let collection = &config.collection;

        for (path, value) in [
            ("collection.name", &collection.name),
            ("collection.dense_vector", &collection.dense_vector),
            ("collection.sparse_vector", &collection.sparse_vector),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::new(path, "Name cannot be empty"));
            }
        }

        if collection.dense_vector == collection.sparse_vector {
            errors.push(ValidationError::new(
                "collection.sparse_vector",
                format!(
                    "Dense and sparse vectors need distinct names, both are '{}'",
                    collection.dense_vector
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if embedding.dense_model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.dense_model",
                "Model name cannot be empty",
            ));
        }

        if embedding.hashing_dim == 0 {
            errors.push(ValidationError::new(
                "embedding.hashing_dim",
                "Hashing dimension must be greater than 0",
            ));
        }

        let bm25 = &embedding.bm25;
        if !(bm25.k1 >= 0.0) {
            errors.push(ValidationError::new(
                "embedding.bm25.k1",
                format!("k1 must be non-negative, got {}", bm25.k1),
            ));
        }
        if !(0.0..=1.0).contains(&bm25.b) {
            errors.push(ValidationError::new(
                "embedding.bm25.b",
                format!("b must be between 0.0 and 1.0, got {}", bm25.b),
            ));
        }
        if !(bm25.avg_len > 0.0) {
            errors.push(ValidationError::new(
                "embedding.bm25.avg_len",
                format!("avg_len must be greater than 0, got {}", bm25.avg_len),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        } else if chunking.chunk_overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    chunking.chunk_overlap, chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.limit == 0 {
            errors.push(ValidationError::new(
                "search.limit",
                "Limit must be greater than 0",
            ));
        }

        if !(search.rrf_k > 0.0) {
            errors.push(ValidationError::new(
                "search.rrf_k",
                format!("rrf_k must be greater than 0, got {}", search.rrf_k),
            ));
        }

        for (path, weight) in [
            ("search.dense_weight", search.dense_weight),
            ("search.sparse_weight", search.sparse_weight),
        ] {
            if !(weight > 0.0) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be positive, got {}", weight),
                ));
            }
        }

        if search.prefetch_multiplier == 0 {
            errors.push(ValidationError::new(
                "search.prefetch_multiplier",
                "Prefetch multiplier must be greater than 0",
            ));
        }
    }

    fn validate_insert(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.insert.concurrency == 0 {
            errors.push(ValidationError::new(
                "insert.concurrency",
                "Concurrency must be at least 1",
            ));
        }
    }
}
