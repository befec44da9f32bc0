//! Entry points for callers of the retrieval core
//!
//! [`RagPipeline`] wires the chunker, both embedders, the collection manager,
//! the inserter and the hybrid searcher around one shared vector store.

use crate::cancel::CancelToken;
use crate::chunking::{Chunks, TextChunker};
use crate::config::Config;
use crate::embedding::{dense_from_config, sparse_from_config, DenseEmbedder, SparseEmbedder};
use crate::error::{RagError, Result};
use crate::retrieval::{Document, HybridSearcher, MetadataFilter, SearchResults};
use crate::storage::{CollectionInfo, CollectionManager, DocumentInserter, SqliteStore, VectorStore};
use std::path::Path;
use std::sync::Arc;

pub struct RagPipeline {
    config: Config,
    dense: Arc<dyn DenseEmbedder>,
    chunker: TextChunker,
    collections: CollectionManager,
    inserter: DocumentInserter,
    searcher: HybridSearcher,
}

impl RagPipeline {
    /// Assemble a pipeline over an existing store and embedders
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.chunking)?;
        let collections = CollectionManager::new(store.clone(), config.collection.clone());
        let inserter = DocumentInserter::new(
            store.clone(),
            dense.clone(),
            sparse.clone(),
            config.collection.name.clone(),
            config.insert,
        )?;
        let searcher = HybridSearcher::new(
            store,
            dense.clone(),
            sparse,
            config.collection.name.clone(),
            config.search,
        )?;

        Ok(Self {
            config,
            dense,
            chunker,
            collections,
            inserter,
            searcher,
        })
    }

    /// Open the configured SQLite store and build the configured embedders
    pub fn open(config: Config) -> Result<Self> {
        let path = config.store.resolved_path()?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::open(&path, config.store.pool_size)?);

        let dense = dense_from_config(&config.embedding)?;
        let sparse = sparse_from_config(&config.embedding);

        tracing::info!(
            "Pipeline ready: collection {}, dense model {}, sparse model {}",
            config.collection.name,
            dense.model_name(),
            sparse.model_name()
        );

        Self::new(config, store, dense, sparse)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dense_model(&self) -> &str {
        self.dense.model_name()
    }

    /// Split a document into heading-tagged chunks. Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Chunks {
        self.chunker.chunk(text)
    }

    /// Embed and write `chunks`; returns the number of records written
    pub fn insert(&self, chunks: &Chunks) -> Result<usize> {
        self.inserter.insert(chunks)
    }

    pub fn insert_with_cancel(&self, chunks: &Chunks, cancel: &CancelToken) -> Result<usize> {
        self.inserter.insert_with_cancel(chunks, cancel)
    }

    /// Chunk `text` and insert the result
    pub fn ingest(&self, text: &str) -> Result<usize> {
        let chunks = self.chunk(text);
        self.insert(&chunks)
    }

    pub fn search(&self, query: &str, filter: Option<&MetadataFilter>) -> Result<Vec<Document>> {
        Ok(self.searcher.search(query, filter)?)
    }

    pub fn search_with_cancel(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>> {
        Ok(self.searcher.search_with_cancel(query, filter, cancel)?)
    }

    pub fn search_in_section(&self, query: &str, section: &str) -> Result<Vec<Document>> {
        Ok(self.searcher.search_in_section(query, section)?)
    }

    /// Dense-only and sparse-only rankings, unfused
    pub fn search_separately(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<SearchResults> {
        Ok(self.searcher.search_separately(query, filter)?)
    }

    pub fn search_separately_with_cancel(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        cancel: &CancelToken,
    ) -> Result<SearchResults> {
        Ok(self
            .searcher
            .search_separately_with_cancel(query, filter, cancel)?)
    }

    /// Drop and rebuild the collection for `dimension`-sized dense vectors.
    ///
    /// Destructive. Must not run concurrently with inserts on the collection.
    pub fn recreate_collection(&self, dimension: usize) -> Result<()> {
        Ok(self.collections.recreate(dimension)?)
    }

    /// Recreate the collection with the dense model's own dimension
    pub fn recreate_for_model(&self) -> Result<usize> {
        let dimension = self.dense.dimension()?;
        self.recreate_collection(dimension)?;
        Ok(dimension)
    }

    pub fn delete_collection(&self) -> Result<()> {
        Ok(self.collections.delete()?)
    }

    pub fn collection_exists(&self) -> Result<bool> {
        Ok(self.collections.exists()?)
    }

    pub fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.info()?)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.collections.count()?)
    }
}

/// Read a UTF-8 document from disk
pub fn load_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to read document: {:?}", path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HASHING_MODEL;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.path = temp.path().join("store.db");
        config.embedding.dense_model = HASHING_MODEL.to_string();
        config.embedding.hashing_dim = 32;
        config
    }

    #[test]
    fn test_open_with_offline_model() {
        let temp = TempDir::new().unwrap();
        let pipeline = RagPipeline::open(config(&temp)).unwrap();

        assert_eq!(pipeline.dense_model(), HASHING_MODEL);
        assert!(!pipeline.collection_exists().unwrap());

        assert_eq!(pipeline.recreate_for_model().unwrap(), 32);
        assert!(pipeline.collection_exists().unwrap());

        let info = pipeline.collection_info().unwrap().unwrap();
        assert_eq!(info.schema.dense.size, 32);
    }

    #[test]
    fn test_ingest_then_search() {
        let temp = TempDir::new().unwrap();
        let pipeline = RagPipeline::open(config(&temp)).unwrap();
        pipeline.recreate_for_model().unwrap();

        let written = pipeline
            .ingest("# Manual\n## Backup\nCopy the data directory to remote storage nightly.")
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(pipeline.count().unwrap(), 1);

        let results = pipeline.search("backup data directory", None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.header_2.as_deref(), Some("Backup"));
    }

    #[test]
    fn test_ingest_empty_document() {
        let temp = TempDir::new().unwrap();
        let pipeline = RagPipeline::open(config(&temp)).unwrap();
        pipeline.recreate_for_model().unwrap();

        assert_eq!(pipeline.ingest("").unwrap(), 0);
        assert_eq!(pipeline.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_without_collection_fails() {
        let temp = TempDir::new().unwrap();
        let pipeline = RagPipeline::open(config(&temp)).unwrap();

        let err = pipeline.ingest("some text").unwrap_err();
        assert!(!err.is_retryable());
        assert!(!err.requires_recreate());
    }

    #[test]
    fn test_load_document_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_document(&temp.path().join("missing.md")).unwrap_err();
        assert!(matches!(err, RagError::Io { .. }));
    }
}
