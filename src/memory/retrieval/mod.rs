//! Retrieval, ranking and reranking for memory search.

pub mod ranking;
pub mod rerank;
pub mod search;

pub use ranking::{KeywordQuery, compare_score_then_recency, sort_by_score_then_recency};
pub use rerank::{CompletionReranker, RerankFuture, RerankScore, Reranker};
pub use search::{MetadataFilter, SearchOptions};
