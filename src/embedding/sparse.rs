//! BM25-style sparse embedder over a hashed vocabulary

use super::{EmbeddingError, SparseEmbedder, SparseVector};
use crate::config::Bm25Config;
use ahash::AHashMap;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this",
    "these", "they", "them", "their", "there", "then", "than", "so", "if", "when", "where", "why",
    "how", "what", "which", "who", "whom", "whose", "can", "could", "should", "would", "may",
    "might", "must", "shall", "do", "does", "did", "have", "had", "having",
];

/// Longest token kept, in bytes
const MAX_TOKEN_LEN: usize = 40;

/// Tokenize, lowercase and stem text into terms
#[derive(Clone)]
pub(crate) struct TermAnalyzer {
    analyzer: TextAnalyzer,
}

impl TermAnalyzer {
    /// Analyzer that also drops English stop words
    pub(crate) fn lexical() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(
                STOP_WORDS.iter().map(|s| s.to_string()),
            ))
            .filter(Stemmer::new(Language::English))
            .build();
        Self { analyzer }
    }

    /// Analyzer that keeps every word
    pub(crate) fn plain() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build();
        Self { analyzer }
    }

    pub(crate) fn terms(&self, text: &str) -> Vec<String> {
        // token_stream needs a mutable analyzer; clones share the pipeline
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(stream.token().text.clone());
        }
        terms
    }
}

/// Map a term to its vocabulary slot
pub(crate) fn term_index(term: &str) -> u32 {
    let hash = blake3::hash(term.as_bytes());
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Sparse embedder producing BM25 term-frequency weights.
///
/// Document vectors carry the saturated term frequency
/// `tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len))`. Query vectors
/// weigh every distinct term 1.0. The inverse document frequency factor is
/// applied by the index at query time from collection statistics.
#[derive(Clone)]
pub struct Bm25Embedder {
    analyzer: TermAnalyzer,
    config: Bm25Config,
}

impl Bm25Embedder {
    pub fn new(config: Bm25Config) -> Self {
        Self {
            analyzer: TermAnalyzer::lexical(),
            config,
        }
    }

    fn term_frequencies(&self, text: &str) -> (AHashMap<u32, u32>, usize) {
        let terms = self.analyzer.terms(text);
        let mut frequencies: AHashMap<u32, u32> = AHashMap::with_capacity(terms.len());
        for term in &terms {
            *frequencies.entry(term_index(term)).or_insert(0) += 1;
        }
        (frequencies, terms.len())
    }
}

impl Default for Bm25Embedder {
    fn default() -> Self {
        Self::new(Bm25Config::default())
    }
}

impl SparseEmbedder for Bm25Embedder {
    fn embed(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        let (frequencies, doc_len) = self.term_frequencies(text);
        if frequencies.is_empty() {
            return Ok(SparseVector::default());
        }

        let Bm25Config { k1, b, avg_len } = self.config;
        let length_norm = 1.0 - b + b * doc_len as f32 / avg_len;

        let pairs = frequencies
            .into_iter()
            .map(|(index, tf)| {
                let tf = tf as f32;
                (index, tf * (k1 + 1.0) / (tf + k1 * length_norm))
            })
            .collect();

        Ok(SparseVector::from_pairs(pairs))
    }

    fn embed_query(&self, text: &str) -> Result<SparseVector, EmbeddingError> {
        let (frequencies, _) = self.term_frequencies(text);
        let pairs = frequencies
            .into_iter()
            .map(|(index, _)| (index, 1.0))
            .collect();
        Ok(SparseVector::from_pairs(pairs))
    }

    fn model_name(&self) -> &str {
        "bm25"
    }
}
