//! Search result types and client-side merging

use crate::chunking::Headings;
use crate::storage::ScoredPoint;
use ahash::AHashSet;
use serde::Serialize;
use uuid::Uuid;

/// A retrieved chunk with its fused relevance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub score: f32,
    pub chunk_index: usize,
    pub metadata: Headings,
}

impl From<ScoredPoint> for Document {
    fn from(point: ScoredPoint) -> Self {
        Self {
            id: point.id,
            content: point.payload.content,
            score: point.score,
            chunk_index: point.payload.chunk_index,
            metadata: point.payload.metadata,
        }
    }
}

/// Hit from a single-channel query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub score: f32,
    pub chunk_index: usize,
}

impl SearchResult {
    /// Single-line preview for display
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.content.replace('\n', " ");
        if flat.chars().count() <= max_chars {
            flat
        } else {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

impl From<ScoredPoint> for SearchResult {
    fn from(point: ScoredPoint) -> Self {
        Self {
            content: point.payload.content,
            score: point.score,
            chunk_index: point.payload.chunk_index,
        }
    }
}

/// Rankings of independently issued dense-only and sparse-only queries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub dense: Vec<SearchResult>,
    pub sparse: Vec<SearchResult>,
}

impl SearchResults {
    pub fn new(dense: Vec<SearchResult>, sparse: Vec<SearchResult>) -> Self {
        Self { dense, sparse }
    }

    /// Union of both rankings by exact content, dense hits first.
    ///
    /// The first occurrence of each content wins; scores are not compared.
    pub fn all_unique_contents(&self) -> Vec<String> {
        let mut seen: AHashSet<&str> = AHashSet::new();
        self.dense
            .iter()
            .chain(self.sparse.iter())
            .filter(|result| seen.insert(result.content.as_str()))
            .map(|result| result.content.clone())
            .collect()
    }

    pub fn total_hits(&self) -> usize {
        self.dense.len() + self.sparse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty() && self.sparse.is_empty()
    }
}

/// Join retrieved contents into one context block for a generation step
pub fn format_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
