//! Batch insertion of chunks as dual-vector points

use super::{NamedVectors, Payload, PointRecord, VectorStore};
use crate::cancel::CancelToken;
use crate::chunking::{Chunk, Chunks};
use crate::config::InsertConfig;
use crate::embedding::{DenseEmbedder, SparseEmbedder};
use crate::error::{RagError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Embeds chunks in parallel and writes them in one atomic batch.
///
/// Every call assigns fresh ids, so resending a failed batch creates new
/// points rather than updating old ones.
pub struct DocumentInserter {
    store: Arc<dyn VectorStore>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: Arc<dyn SparseEmbedder>,
    collection: String,
    config: InsertConfig,
    workers: ThreadPool,
}

impl DocumentInserter {
    pub fn new(
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: Arc<dyn SparseEmbedder>,
        collection: impl Into<String>,
        config: InsertConfig,
    ) -> Result<Self> {
        let workers = ThreadPoolBuilder::new()
            .num_threads(config.concurrency.max(1))
            .thread_name(|i| format!("hybrid-rag-embed-{}", i))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to start embedding workers: {}", e)))?;

        Ok(Self {
            store,
            dense,
            sparse,
            collection: collection.into(),
            config,
            workers,
        })
    }

    /// Insert `chunks`, returning the number of points written
    pub fn insert(&self, chunks: &Chunks) -> Result<usize> {
        self.insert_with_cancel(chunks, &CancelToken::new())
    }

    /// Insert `chunks`, stopping before the write if `cancel` trips.
    ///
    /// A cancelled or failed call writes nothing.
    pub fn insert_with_cancel(&self, chunks: &Chunks, cancel: &CancelToken) -> Result<usize> {
        if chunks.is_empty() {
            tracing::debug!("No chunks to insert into {}", self.collection);
            return Ok(0);
        }

        cancel.check()?;

        let started = Instant::now();
        tracing::info!(
            "Embedding {} chunk(s) for {} on {} worker(s)",
            chunks.len(),
            self.collection,
            self.workers.current_num_threads()
        );

        let points: Vec<PointRecord> = self.workers.install(|| {
            chunks
                .as_slice()
                .par_iter()
                .map(|chunk| self.to_point(chunk, cancel))
                .collect::<Result<Vec<_>>>()
        })?;

        cancel.check()?;

        let written = self.store.upsert(&self.collection, points, self.config.wait)?;

        tracing::info!(
            "Inserted {} point(s) into {} in {}ms",
            written,
            self.collection,
            started.elapsed().as_millis()
        );

        Ok(written)
    }

    fn to_point(&self, chunk: &Chunk, cancel: &CancelToken) -> Result<PointRecord> {
        cancel.check()?;

        let dense = self.dense.embed(&chunk.content)?;
        let sparse = self.sparse.embed(&chunk.content)?;

        Ok(PointRecord {
            id: Uuid::new_v4(),
            vectors: NamedVectors::new(dense, sparse),
            payload: Payload {
                content: chunk.content.clone(),
                chunk_index: chunk.index,
                metadata: chunk.metadata.clone(),
            },
        })
    }
}
