//! Near-duplicate detection for incoming memories.
//!
//! A new text is a near-duplicate when its embedding's cosine similarity to
//! the single nearest stored record reaches the configured threshold. The
//! comparison is inclusive.

use crate::memory::core::config::DedupeConfig;
use crate::memory::core::record::MemoryRecord;
use crate::memory::storage::vector_store::VectorHit;

/// Default threshold for considering two memories as near-duplicates.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.95;

/// Outcome of a near-duplicate check.
#[derive(Clone, Debug, PartialEq)]
pub enum DedupeDecision {
    /// No stored record is close enough; insert the new one.
    Unique,
    /// An existing record already carries this meaning.
    Duplicate {
        /// The existing record, returned unchanged.
        existing: Box<MemoryRecord>,
        /// Similarity between the new text and the existing record.
        similarity: f64,
    },
}

/// Whether a similarity reaches the duplicate threshold.
#[must_use]
pub fn is_near_duplicate(similarity: f64, threshold: f64) -> bool {
    similarity >= threshold
}

/// Classify the nearest stored record against the dedupe policy.
#[must_use]
pub fn classify(nearest: Option<VectorHit>, config: &DedupeConfig) -> DedupeDecision {
    match nearest {
        Some(hit) if config.enabled && is_near_duplicate(hit.score, config.threshold) => {
            DedupeDecision::Duplicate {
                similarity: hit.score,
                existing: Box::new(hit.record),
            }
        }
        _ => DedupeDecision::Unique,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::metadata::Metadata;

    fn hit(score: f64) -> VectorHit {
        VectorHit {
            score,
            record: MemoryRecord::new("existing", vec![1.0, 0.0], Metadata::new()),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = DedupeConfig::default();
        let eps = 1e-9;
        assert!(matches!(
            classify(Some(hit(DEFAULT_SEMANTIC_THRESHOLD)), &config),
            DedupeDecision::Duplicate { .. }
        ));
        assert!(matches!(
            classify(Some(hit(DEFAULT_SEMANTIC_THRESHOLD + eps)), &config),
            DedupeDecision::Duplicate { .. }
        ));
        assert_eq!(
            classify(Some(hit(DEFAULT_SEMANTIC_THRESHOLD - eps)), &config),
            DedupeDecision::Unique
        );
    }

    #[test]
    fn test_disabled_or_empty_is_unique() {
        let disabled = DedupeConfig {
            enabled: false,
            ..DedupeConfig::default()
        };
        assert_eq!(classify(Some(hit(1.0)), &disabled), DedupeDecision::Unique);
        assert_eq!(classify(None, &DedupeConfig::default()), DedupeDecision::Unique);
    }
}
