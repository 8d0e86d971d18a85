//! Ingestion helpers: normalization and near-duplicate detection.

pub mod dedupe;
pub mod semantic_dedupe;

pub use dedupe::{cosine_similarity, normalize_text};
pub use semantic_dedupe::{DedupeDecision, classify, is_near_duplicate};
