//! hybrid-rag - Structure-aware chunking and filtered hybrid retrieval
//!
//! Markdown documents are split along their headings into bounded chunks.
//! Every chunk is stored with a dense and a sparse vector plus its heading
//! metadata, and queries fuse both rankings with optional exact-match
//! heading filters.

pub mod cancel;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod retrieval;
pub mod storage;

pub use error::{RagError, Result};
pub use pipeline::RagPipeline;
