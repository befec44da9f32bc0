//! Structure-aware chunking
//!
//! Two passes turn raw document text into indexable chunks:
//! - `markdown`: split on `#`, `##` and `###` headings, tagging every section
//!   with the enclosing heading at each level
//! - `recursive`: window each section to a maximum character length, falling
//!   back from paragraph to line to word to character boundaries, with a
//!   bounded overlap between consecutive windows of one section

mod markdown;
mod recursive;

pub use markdown::{split_sections, Section};
pub use recursive::RecursiveSplitter;

use crate::config::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}

/// Heading hierarchy above a chunk.
///
/// A level is `None` when the source never declared a heading at that level
/// above the chunk; `Some("")` is a heading that was declared but left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Headings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_3: Option<String>,
}

impl Headings {
    /// Payload keys of the three heading levels, shallowest first
    pub const KEYS: [&'static str; 3] = ["header_1", "header_2", "header_3"];

    pub fn is_empty(&self) -> bool {
        self.header_1.is_none() && self.header_2.is_none() && self.header_3.is_none()
    }

    /// Heading at `level` (1-based)
    pub fn level(&self, level: usize) -> Option<&str> {
        match level {
            1 => self.header_1.as_deref(),
            2 => self.header_2.as_deref(),
            3 => self.header_3.as_deref(),
            _ => None,
        }
    }

    /// Heading by payload key (`header_1` .. `header_3`)
    pub fn get(&self, key: &str) -> Option<&str> {
        Self::KEYS
            .iter()
            .position(|k| *k == key)
            .and_then(|i| self.level(i + 1))
    }

    /// Declare a heading at `level`, dropping every deeper level
    pub(crate) fn enter(&mut self, level: usize, title: String) {
        match level {
            1 => {
                self.header_1 = Some(title);
                self.header_2 = None;
                self.header_3 = None;
            }
            2 => {
                self.header_2 = Some(title);
                self.header_3 = None;
            }
            3 => self.header_3 = Some(title),
            _ => {}
        }
    }

    /// Declared levels as `(key, title)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::KEYS
            .iter()
            .enumerate()
            .filter_map(move |(i, key)| self.level(i + 1).map(|title| (*key, title)))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(key, title)| (key.to_string(), title.to_string()))
            .collect()
    }
}

/// A contiguous span of source text plus its heading metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Position within the document's chunk sequence (0-based, contiguous)
    pub index: usize,
    pub metadata: Headings,
}

impl Chunk {
    /// Single-line preview for logs
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

/// Ordered result of one chunking pass. Empty is a valid outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunks {
    items: Vec<Chunk>,
}

impl Chunks {
    pub fn new(items: Vec<Chunk>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Chunk] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Chunk> {
        self.items
    }
}

impl IntoIterator for Chunks {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Chunks {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Heading-aware, size-bounded document chunker
#[derive(Debug, Clone)]
pub struct TextChunker {
    splitter: RecursiveSplitter,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        let splitter = RecursiveSplitter::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self { splitter })
    }

    pub fn chunk_size(&self) -> usize {
        self.splitter.chunk_size()
    }

    pub fn chunk_overlap(&self) -> usize {
        self.splitter.chunk_overlap()
    }

    /// Split `text` into chunks indexed `0..n` in document order
    pub fn chunk(&self, text: &str) -> Chunks {
        let sections = split_sections(text);
        let mut items = Vec::new();

        for section in sections {
            for window in self.splitter.split_text(&section.content) {
                items.push(Chunk {
                    content: window,
                    index: items.len(),
                    metadata: section.headings.clone(),
                });
            }
        }

        tracing::debug!("Chunked document into {} chunk(s)", items.len());

        Chunks::new(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_nested_headings_single_chunk() {
        let chunks = chunker(500, 50).chunk("# A\n## B\nhello world");

        assert_eq!(chunks.len(), 1);
        let chunk = chunks.get(0).unwrap();
        assert_eq!(chunk.content, "hello world");
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.metadata.header_1.as_deref(), Some("A"));
        assert_eq!(chunk.metadata.header_2.as_deref(), Some("B"));
        assert_eq!(chunk.metadata.header_3, None);
    }

    #[test]
    fn test_empty_input_is_empty_result() {
        let chunks = chunker(500, 50).chunk("");
        assert!(chunks.is_empty());

        let chunks = chunker(500, 50).chunk("   \n\n  ");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_no_headings_has_empty_metadata() {
        let text = "plain text without any structure. ".repeat(40);
        let chunks = chunker(100, 10).chunk(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.metadata.is_empty());
            assert!(chunk.metadata.to_map().is_empty());
        }
    }

    #[test]
    fn test_indices_are_contiguous_across_sections() {
        let text = "# One\nalpha beta gamma delta\n\n# Two\nepsilon zeta eta theta\n## Sub\niota kappa";
        let chunks = chunker(12, 4).chunk(text);

        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
        }
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let result = TextChunker::new(ChunkingConfig {
            chunk_size: 50,
            chunk_overlap: 50,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_headings_lookup() {
        let mut headings = Headings::default();
        headings.enter(1, "Guide".to_string());
        headings.enter(3, "Details".to_string());

        assert_eq!(headings.get("header_1"), Some("Guide"));
        assert_eq!(headings.get("header_2"), None);
        assert_eq!(headings.get("header_3"), Some("Details"));
        assert_eq!(headings.get("header_9"), None);

        headings.enter(1, "Other".to_string());
        assert_eq!(headings.header_3, None);
        assert_eq!(headings.to_map().len(), 1);
    }

    #[test]
    fn test_headings_serialize_only_declared_levels() {
        let mut headings = Headings::default();
        headings.enter(2, "Section".to_string());

        let json = serde_json::to_value(&headings).unwrap();
        assert_eq!(json, serde_json::json!({ "header_2": "Section" }));
    }

    #[test]
    fn test_preview_truncates() {
        let chunk = Chunk {
            content: "line one\nline two".to_string(),
            index: 0,
            metadata: Headings::default(),
        };
        assert_eq!(chunk.preview(8), "line one...");
        assert_eq!(chunk.preview(100), "line one line two");
    }
}
