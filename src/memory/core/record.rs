//! Memory record model stored in the vector backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::metadata::Metadata;

/// Maximum accepted memory text length in characters.
pub const MAX_TEXT_CHARS: usize = 16_384;

/// A persisted semantic memory with its embedding.
///
/// The embedding is never serialized to callers; backends persist it through
/// their own document types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable identifier.
    pub id: MemoryId,
    /// Memory text.
    pub text: String,
    /// Embedding of `text`, length equal to the configured dimension.
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f64>,
    /// Scalar metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record with a content-derived id and the current timestamp.
    #[must_use]
    pub fn new(text: &str, embedding: Vec<f64>, metadata: Metadata) -> Self {
        Self {
            id: MemoryId::from_content(text),
            text: text.to_string(),
            embedding,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Validate and trim memory text.
///
/// # Errors
/// Returns `InvalidInput` if the text is empty or too long.
pub fn clean_text(text: &str) -> MemoryResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::InvalidInput(
            "memory text is empty".to_string(),
        ));
    }
    let len = trimmed.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(MemoryError::InvalidInput(format!(
            "memory text too long: got {len}, max {MAX_TEXT_CHARS}"
        )));
    }
    Ok(trimmed)
}

/// Ensure an embedding has the expected dimension and finite components.
///
/// # Errors
/// Returns `Embedding` describing the mismatch.
pub fn check_embedding(embedding: &[f64], ndims: usize) -> MemoryResult<()> {
    if embedding.len() != ndims {
        return Err(MemoryError::Embedding(format!(
            "embedding has {} dimensions, expected {ndims}",
            embedding.len()
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(MemoryError::Embedding(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}
