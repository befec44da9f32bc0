//! Integration tests: chunk -> insert -> hybrid search
//!
//! Uses the offline hashing embedder and BM25 so every run is deterministic
//! and needs no model download.

use hybrid_rag::cancel::CancelToken;
use hybrid_rag::config::Config;
use hybrid_rag::embedding::{
    Bm25Embedder, DenseEmbedder, EmbeddingError, HashingEmbedder, HASHING_MODEL,
};
use hybrid_rag::retrieval::MetadataFilter;
use hybrid_rag::storage::{SqliteStore, VectorStore};
use hybrid_rag::{RagError, RagPipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const HANDBOOK: &str = "\
# Operations Handbook
This handbook covers the daily running of the storage cluster.

## Install
Download the release archive from the mirror and unpack it under /opt.
Verify the archive checksum against the published signature before running anything.

Create a dedicated service account with no login shell.

## Backup
Snapshots run every night at two and are copied to the remote bucket.
Retention keeps fourteen daily snapshots and six monthly ones.

### Restore
Stop the writer process, fetch the snapshot and replay the journal.

## Monitoring
Dashboards track disk latency, replication lag and queue depth.
Alerts page the on-call engineer when replication lag exceeds five minutes.
";

fn config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.store.path = temp.path().join("store.db");
    config.embedding.dense_model = HASHING_MODEL.to_string();
    config.embedding.hashing_dim = 64;
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config
}

fn pipeline(temp: &TempDir) -> RagPipeline {
    RagPipeline::open(config(temp)).unwrap()
}

fn populated(temp: &TempDir) -> RagPipeline {
    let pipeline = pipeline(temp);
    pipeline.recreate_for_model().unwrap();
    let chunks = pipeline.chunk(HANDBOOK);
    pipeline.insert(&chunks).unwrap();
    pipeline
}

#[test]
fn test_end_to_end_flow() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline(&temp);

    assert_eq!(pipeline.recreate_for_model().unwrap(), 64);
    assert!(pipeline.collection_exists().unwrap());

    let chunks = pipeline.chunk(HANDBOOK);
    assert!(chunks.len() > 4);

    let written = pipeline.insert(&chunks).unwrap();
    assert_eq!(written, chunks.len());
    assert_eq!(pipeline.count().unwrap(), chunks.len());

    let results = pipeline.search("how are snapshots retained", None).unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= pipeline.config().search.limit);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn test_filtered_round_trip() {
    let temp = TempDir::new().unwrap();
    let pipeline = populated(&temp);

    for chunk in &pipeline.chunk(HANDBOOK) {
        let filter: MetadataFilter = chunk.metadata.to_map().into_iter().collect();
        let results = pipeline.search(&chunk.content, Some(&filter)).unwrap();

        assert!(
            results.iter().any(|doc| doc.content == chunk.content),
            "chunk {} not found under its own headings",
            chunk.index
        );
        for doc in &results {
            for (key, title) in chunk.metadata.iter() {
                assert_eq!(doc.metadata.get(key), Some(title));
            }
        }
    }
}

#[test]
fn test_filter_is_strict_conjunction() {
    let temp = TempDir::new().unwrap();
    let pipeline = populated(&temp);

    for query in ["archive checksum", "replication lag alerts", "snapshot journal"] {
        let results = pipeline
            .search(query, Some(&MetadataFilter::section("Backup")))
            .unwrap();
        for doc in &results {
            assert_eq!(doc.metadata.header_2.as_deref(), Some("Backup"));
        }
    }

    let filter = MetadataFilter::new()
        .with("header_2", "Backup")
        .with("header_3", "Restore");
    let results = pipeline.search("replay the journal", Some(&filter)).unwrap();
    assert!(!results.is_empty());
    for doc in &results {
        assert_eq!(doc.metadata.header_2.as_deref(), Some("Backup"));
        assert_eq!(doc.metadata.header_3.as_deref(), Some("Restore"));
    }

    let contradictory = MetadataFilter::new()
        .with("header_2", "Install")
        .with("header_3", "Restore");
    assert!(pipeline
        .search("journal", Some(&contradictory))
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_section_is_empty_not_error() {
    let temp = TempDir::new().unwrap();
    let pipeline = populated(&temp);

    let results = pipeline
        .search("unrelated", Some(&MetadataFilter::section("NoSuchSection")))
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_separate_channels_merge() {
    let temp = TempDir::new().unwrap();
    let pipeline = populated(&temp);

    let results = pipeline
        .search_separately("replication lag dashboards", None)
        .unwrap();
    assert!(!results.is_empty());

    let merged = results.all_unique_contents();
    let mut deduped = merged.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), merged.len());

    // Dense hits come first, in their own order
    let dense: Vec<String> = results.dense.iter().map(|r| r.content.clone()).collect();
    let mut unique_dense = Vec::new();
    for content in dense {
        if !unique_dense.contains(&content) {
            unique_dense.push(content);
        }
    }
    assert_eq!(&merged[..unique_dense.len()], &unique_dense[..]);

    for content in &merged {
        assert!(
            results.dense.iter().any(|r| &r.content == content)
                || results.sparse.iter().any(|r| &r.content == content)
        );
    }
}

#[test]
fn test_recreate_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let pipeline = populated(&temp);
    assert!(pipeline.count().unwrap() > 0);

    pipeline.recreate_for_model().unwrap();
    assert!(pipeline.collection_exists().unwrap());
    assert_eq!(pipeline.count().unwrap(), 0);

    pipeline.recreate_for_model().unwrap();
    assert!(pipeline.collection_exists().unwrap());
    assert_eq!(pipeline.count().unwrap(), 0);
}

#[test]
fn test_dimension_mismatch_is_distinct_from_transient_errors() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline(&temp);
    pipeline.recreate_collection(16).unwrap();

    let insert_err = pipeline.ingest(HANDBOOK).unwrap_err();
    assert!(insert_err.requires_recreate());
    assert!(!insert_err.is_retryable());
    assert_eq!(pipeline.count().unwrap(), 0);

    let search_err = pipeline.search("snapshots", None).unwrap_err();
    assert!(search_err.requires_recreate());
    assert!(!search_err.is_retryable());

    pipeline.recreate_for_model().unwrap();
    assert!(pipeline.ingest(HANDBOOK).unwrap() > 0);
}

#[test]
fn test_cancelled_insert_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline(&temp);
    pipeline.recreate_for_model().unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();

    let err = pipeline
        .insert_with_cancel(&pipeline.chunk(HANDBOOK), &cancel)
        .unwrap_err();
    assert!(matches!(err, RagError::Cancelled(_)));
    assert_eq!(pipeline.count().unwrap(), 0);
}

/// Hashing embedder that cancels a shared token on its n-th call
struct CancelOnCall {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    cancel_at: usize,
    cancel: CancelToken,
}

impl DenseEmbedder for CancelOnCall {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.cancel_at {
            self.cancel.cancel();
        }
        self.inner.embed(text)
    }

    fn dimension(&self) -> Result<usize, EmbeddingError> {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[test]
fn test_cancel_mid_batch_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let store: Arc<dyn VectorStore> =
        Arc::new(SqliteStore::open(&config.store.path, config.store.pool_size).unwrap());
    let cancel = CancelToken::new();
    let dense = Arc::new(CancelOnCall {
        inner: HashingEmbedder::new(64).unwrap(),
        calls: AtomicUsize::new(0),
        cancel_at: 2,
        cancel: cancel.clone(),
    });

    let pipeline =
        RagPipeline::new(config, store, dense.clone(), Arc::new(Bm25Embedder::default())).unwrap();
    pipeline.recreate_collection(64).unwrap();

    let chunks = pipeline.chunk(HANDBOOK);
    assert!(chunks.len() > 3);

    let err = pipeline.insert_with_cancel(&chunks, &cancel).unwrap_err();
    assert!(matches!(err, RagError::Cancelled(_)));
    assert!(dense.calls.load(Ordering::SeqCst) > 2);
    assert_eq!(pipeline.count().unwrap(), 0);

    // A fresh token lets the same batch through
    assert_eq!(pipeline.insert(&chunks).unwrap(), chunks.len());
}

#[test]
fn test_concurrent_ingest_and_search() {
    const WORKERS: usize = 6;
    const ROUNDS: usize = 3;

    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(pipeline(&temp));
    pipeline.recreate_for_model().unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || -> hybrid_rag::Result<usize> {
                let section = format!("Worker {}", worker);
                let document = format!(
                    "# Fleet\n## {section}\n\
                     Node {worker} rotates its journal every night and ships logs to collector {worker}.\n\n\
                     Node {worker} restarts after every kernel update.\n"
                );
                let filter = MetadataFilter::section(section.as_str());

                let mut written = 0;
                for _ in 0..ROUNDS {
                    written += pipeline.ingest(&document)?;

                    let results = pipeline.search("journal logs collector", Some(&filter))?;
                    assert!(!results.is_empty(), "{} found nothing", section);
                    for doc in &results {
                        assert_eq!(doc.metadata.header_2.as_deref(), Some(section.as_str()));
                    }
                }
                Ok(written)
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        let written = handle.join().expect("worker panicked").unwrap();
        assert!(written >= ROUNDS);
        total += written;
    }

    assert_eq!(pipeline.count().unwrap(), total);
    assert!(!pipeline.search("kernel update", None).unwrap().is_empty());
}

#[test]
fn test_store_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let count = {
        let pipeline = populated(&temp);
        pipeline.count().unwrap()
    };

    let reopened = pipeline(&temp);
    assert!(reopened.collection_exists().unwrap());
    assert_eq!(reopened.count().unwrap(), count);
    assert!(!reopened.search("snapshots", None).unwrap().is_empty());
}
