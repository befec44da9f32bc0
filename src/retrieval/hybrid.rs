//! Hybrid search combining the dense and sparse channels

use crate::cancel::{CancelToken, Cancelled};
use crate::config::SearchConfig;
use crate::embedding::{DenseEmbedder, EmbeddingError, SparseEmbedder, SparseVector};
use crate::retrieval::{
    Document, FusionConfig, FusionError, MetadataFilter, SearchResult, SearchResults,
};
use crate::storage::{QueryRequest, QueryVectors, StoreError, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index query failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid fusion settings: {0}")]
    Fusion(#[from] FusionError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Embedding(e) => e.is_retryable(),
            SearchError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The collection was built for a different embedding dimension
    pub fn requires_recreate(&self) -> bool {
        matches!(self, SearchError::Store(e) if e.is_dimension_mismatch())
    }
}

/// Filtered hybrid search over one collection.
///
/// The query is embedded by both embedders and the index fuses the two
/// rankings in a single pass. Embedding failures abort the call; there is
/// no single-channel fallback.
pub struct HybridSearcher {
    store: Arc<dyn VectorStore>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
    collection: String,
    config: SearchConfig,
    fusion: FusionConfig,
}

impl HybridSearcher {
    pub fn new(
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
        collection: impl Into<String>,
        config: SearchConfig,
    ) -> Result<Self, SearchError> {
        if config.limit == 0 {
            return Err(SearchError::InvalidQuery(
                "Result limit must be greater than 0".to_string(),
            ));
        }

        let fusion = FusionConfig::new(config.rrf_k, config.dense_weight, config.sparse_weight)?;

        Ok(Self {
            store,
            dense,
            sparse,
            collection: collection.into(),
            config,
            fusion,
        })
    }

    pub fn limit(&self) -> usize {
        self.config.limit
    }

    /// Up to `limit` documents in decreasing fused relevance.
    ///
    /// A filter that excludes everything yields an empty list, not an error.
    pub fn search(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, SearchError> {
        self.search_with_cancel(query, filter, &CancelToken::new())
    }

    pub fn search_with_cancel(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>, SearchError> {
        cancel.check()?;

        let started = Instant::now();
        let (dense, sparse) = self.embed_query(query)?;

        cancel.check()?;

        let request = QueryRequest::new(QueryVectors::Hybrid { dense, sparse }, self.config.limit)
            .with_filter(filter.map(MetadataFilter::to_store_filter))
            .with_prefetch_limit(self.prefetch_limit())
            .with_fusion(self.fusion);

        let points = self.store.query(&self.collection, &request)?;

        tracing::debug!(
            "Hybrid search in {} returned {} result(s) in {}ms",
            self.collection,
            points.len(),
            started.elapsed().as_millis()
        );

        Ok(points.into_iter().map(Document::from).collect())
    }

    /// Search under one second-level heading
    pub fn search_in_section(
        &self,
        query: &str,
        section: &str,
    ) -> Result<Vec<Document>, SearchError> {
        self.search(query, Some(&MetadataFilter::section(section)))
    }

    /// Issue a dense-only and a sparse-only query and return both rankings
    /// unfused. Merge them with [`SearchResults::all_unique_contents`].
    pub fn search_separately(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<SearchResults, SearchError> {
        self.search_separately_with_cancel(query, filter, &CancelToken::new())
    }

    pub fn search_separately_with_cancel(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        cancel: &CancelToken,
    ) -> Result<SearchResults, SearchError> {
        cancel.check()?;

        let (dense, sparse) = self.embed_query(query)?;
        let store_filter = filter.map(MetadataFilter::to_store_filter);

        let dense_request = QueryRequest::new(QueryVectors::Dense(dense), self.config.limit)
            .with_filter(store_filter.clone());
        let sparse_request = QueryRequest::new(QueryVectors::Sparse(sparse), self.config.limit)
            .with_filter(store_filter);

        cancel.check()?;
        let dense_hits: Vec<SearchResult> = self
            .store
            .query(&self.collection, &dense_request)?
            .into_iter()
            .map(SearchResult::from)
            .collect();

        cancel.check()?;
        let sparse_hits: Vec<SearchResult> = self
            .store
            .query(&self.collection, &sparse_request)?
            .into_iter()
            .map(SearchResult::from)
            .collect();

        tracing::debug!(
            "Separate search in {}: {} dense, {} sparse",
            self.collection,
            dense_hits.len(),
            sparse_hits.len()
        );

        Ok(SearchResults::new(dense_hits, sparse_hits))
    }

    fn embed_query(&self, query: &str) -> Result<(Vec<f32>, SparseVector), SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let dense = self.dense.embed(query)?;
        let sparse = self.sparse.embed_query(query)?;
        Ok((dense, sparse))
    }

    fn prefetch_limit(&self) -> usize {
        self.config
            .limit
            .saturating_mul(self.config.prefetch_multiplier.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunk, Chunks, Headings};
    use crate::config::{CollectionConfig, InsertConfig};
    use crate::embedding::{Bm25Embedder, HashingEmbedder};
    use crate::storage::{CollectionManager, DocumentInserter, SqliteStore};
    use tempfile::TempDir;

    const DIM: usize = 64;

    struct Fixture {
        _temp: TempDir,
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let store: Arc<dyn VectorStore> =
                Arc::new(SqliteStore::open(&temp.path().join("store.db"), 4).unwrap());
            CollectionManager::new(store.clone(), CollectionConfig::default())
                .recreate(DIM)
                .unwrap();

            Self {
                _temp: temp,
                store,
                dense: Arc::new(HashingEmbedder::new(DIM).unwrap()),
                sparse: Arc::new(Bm25Embedder::default()),
            }
        }

        fn insert(&self, items: &[(&str, &str, &str)]) {
            let chunks = Chunks::new(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, (h1, h2, content))| Chunk {
                        content: content.to_string(),
                        index,
                        metadata: Headings {
                            header_1: Some(h1.to_string()),
                            header_2: Some(h2.to_string()),
                            header_3: None,
                        },
                    })
                    .collect(),
            );
            DocumentInserter::new(
                self.store.clone(),
                self.dense.clone(),
                self.sparse.clone(),
                "rag_collection",
                InsertConfig::default(),
            )
            .unwrap()
            .insert(&chunks)
            .unwrap();
        }

        fn searcher(&self) -> HybridSearcher {
            HybridSearcher::new(
                self.store.clone(),
                self.dense.clone(),
                self.sparse.clone(),
                "rag_collection",
                SearchConfig::default(),
            )
            .unwrap()
        }
    }

    fn populated() -> Fixture {
        let fixture = Fixture::new();
        fixture.insert(&[
            ("Guide", "Install", "download the installer package for linux"),
            ("Guide", "Install", "verify the installer checksum before running"),
            ("Guide", "Usage", "run the server with a configuration file"),
            ("Guide", "Usage", "stop the server with a signal"),
            ("Notes", "Tuning", "increase the cache size for large workloads"),
        ]);
        fixture
    }

    #[test]
    fn test_search_respects_limit() {
        let fixture = populated();
        let results = fixture.searcher().search("server installer cache", None).unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_best_match_first() {
        let fixture = populated();
        let results = fixture
            .searcher()
            .search("verify the installer checksum", None)
            .unwrap();

        assert_eq!(results[0].content, "verify the installer checksum before running");
    }

    #[test]
    fn test_filter_is_strict() {
        let fixture = populated();
        let results = fixture
            .searcher()
            .search_in_section("installer server cache", "Usage")
            .unwrap();

        assert!(!results.is_empty());
        for doc in &results {
            assert_eq!(doc.metadata.header_2.as_deref(), Some("Usage"));
        }
    }

    #[test]
    fn test_filter_without_matches_is_empty() {
        let fixture = populated();
        let results = fixture
            .searcher()
            .search_in_section("unrelated", "NoSuchSection")
            .unwrap();

        assert!(results.is_empty());
    }

    #[test]
    fn test_unindexed_filter_key_rejected() {
        let fixture = populated();
        let filter = MetadataFilter::new().with("author", "someone");

        let err = fixture.searcher().search("server", Some(&filter)).unwrap_err();
        assert!(matches!(
            err,
            SearchError::Store(StoreError::UnindexedField { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_query_rejected() {
        let fixture = populated();
        assert!(matches!(
            fixture.searcher().search("   ", None),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_separate_channels() {
        let fixture = populated();
        let results = fixture
            .searcher()
            .search_separately("stop the server", None)
            .unwrap();

        assert!(results.dense.len() <= 3);
        assert!(!results.sparse.is_empty());
        assert_eq!(results.sparse[0].content, "stop the server with a signal");

        let merged = results.all_unique_contents();
        assert!(merged.len() <= results.total_hits());
        assert!(merged.contains(&"stop the server with a signal".to_string()));
    }

    #[test]
    fn test_dimension_mismatch_requires_recreate() {
        let fixture = populated();
        let searcher = HybridSearcher::new(
            fixture.store.clone(),
            Arc::new(HashingEmbedder::new(DIM + 1).unwrap()),
            fixture.sparse.clone(),
            "rag_collection",
            SearchConfig::default(),
        )
        .unwrap();

        let err = searcher.search("server", None).unwrap_err();
        assert!(err.requires_recreate());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancelled_search() {
        let fixture = populated();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = fixture
            .searcher()
            .search_with_cancel("server", None, &cancel)
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(_)));
    }

    /// Trips the shared token as soon as the query has been embedded
    struct CancellingEmbedder {
        inner: HashingEmbedder,
        cancel: CancelToken,
    }

    impl DenseEmbedder for CancellingEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let vector = self.inner.embed(text)?;
            self.cancel.cancel();
            Ok(vector)
        }

        fn dimension(&self) -> Result<usize, EmbeddingError> {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    #[test]
    fn test_cancelled_separate_search() {
        let fixture = populated();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = fixture
            .searcher()
            .search_separately_with_cancel("server", None, &cancel)
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_separate_search_stops_after_embedding() {
        let fixture = populated();
        let cancel = CancelToken::new();
        let searcher = HybridSearcher::new(
            fixture.store.clone(),
            Arc::new(CancellingEmbedder {
                inner: HashingEmbedder::new(DIM).unwrap(),
                cancel: cancel.clone(),
            }),
            fixture.sparse.clone(),
            "rag_collection",
            SearchConfig::default(),
        )
        .unwrap();

        assert!(!cancel.is_cancelled());
        let err = searcher
            .search_separately_with_cancel("server", None, &cancel)
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(_)));
    }

    #[test]
    fn test_invalid_fusion_weights() {
        let fixture = Fixture::new();
        let config = SearchConfig {
            dense_weight: 0.0,
            ..SearchConfig::default()
        };

        let result = HybridSearcher::new(
            fixture.store.clone(),
            fixture.dense.clone(),
            fixture.sparse.clone(),
            "rag_collection",
            config,
        );
        assert!(matches!(
            result,
            Err(SearchError::Fusion(FusionError::InvalidWeights))
        ));
    }
}
