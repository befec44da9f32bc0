//! Hybrid retrieval
//!
//! Queries run through [`HybridSearcher`]: the query text is embedded by both
//! embedders and the index fuses the dense and sparse rankings with
//! Reciprocal Rank Fusion. [`SearchResults::all_unique_contents`] merges two
//! independently issued single-channel rankings on the client side.

mod filter;
mod fusion;
mod hybrid;
mod results;

pub use filter::MetadataFilter;
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::{HybridSearcher, SearchError};
pub use results::{format_context, Document, SearchResult, SearchResults};
