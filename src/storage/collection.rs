//! Collection lifecycle: existence, destructive recreate, schema checks

use super::{
    CollectionInfo, CollectionSchema, DenseVectorParams, Distance, SparseModifier,
    SparseVectorParams, StoreError, VectorStore,
};
use crate::config::CollectionConfig;
use std::sync::Arc;

/// Payload fields indexed for equality filtering on every collection
pub const METADATA_INDEX_FIELDS: [&str; 3] = [
    "metadata.header_1",
    "metadata.header_2",
    "metadata.header_3",
];

/// Creates and destroys the configured collection.
///
/// `recreate` and `delete` are destructive. Callers must not run them
/// concurrently with each other or with inserts on the same collection.
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
    config: CollectionConfig,
}

impl CollectionManager {
    pub fn new(store: Arc<dyn VectorStore>, config: CollectionConfig) -> Self {
        Self { store, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// True iff the configured collection is present
    pub fn exists(&self) -> Result<bool, StoreError> {
        self.store.collection_exists(&self.config.name)
    }

    /// Drop the collection and its records; no-op when absent
    pub fn delete(&self) -> Result<(), StoreError> {
        if self.store.delete_collection(&self.config.name)? {
            tracing::info!("Dropped collection {}", self.config.name);
        } else {
            tracing::debug!("Collection {} absent, nothing to drop", self.config.name);
        }
        Ok(())
    }

    /// Schema a fresh collection of `dimension` gets
    pub fn schema(&self, dimension: usize) -> CollectionSchema {
        CollectionSchema {
            dense: DenseVectorParams {
                name: self.config.dense_vector.clone(),
                size: dimension,
                distance: Distance::Cosine,
            },
            sparse: SparseVectorParams {
                name: self.config.sparse_vector.clone(),
                modifier: SparseModifier::Idf,
            },
            payload_indexes: METADATA_INDEX_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Drop, then create an empty collection with a `dimension`-sized cosine
    /// dense space, an IDF sparse space and the heading payload indexes
    pub fn recreate(&self, dimension: usize) -> Result<(), StoreError> {
        self.delete()?;

        let schema = self.schema(dimension);
        self.store.create_collection(&self.config.name, &schema)?;

        tracing::info!(
            "Recreated collection {} ({}D dense, {} payload indexes)",
            self.config.name,
            dimension,
            schema.payload_indexes.len()
        );

        Ok(())
    }

    /// Fail with `DimensionMismatch` if the stored dense size differs from
    /// `dimension`, or `CollectionNotFound` if the collection is absent
    pub fn ensure_compatible(&self, dimension: usize) -> Result<(), StoreError> {
        let info = self
            .info()?
            .ok_or_else(|| StoreError::CollectionNotFound(self.config.name.clone()))?;

        if info.schema.dense.size != dimension {
            return Err(StoreError::DimensionMismatch {
                collection: self.config.name.clone(),
                expected: info.schema.dense.size,
                actual: dimension,
            });
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.store.count(&self.config.name)
    }

    pub fn info(&self) -> Result<Option<CollectionInfo>, StoreError> {
        self.store.collection_info(&self.config.name)
    }
}
