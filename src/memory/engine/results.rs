//! Labelled search results returned by the stores and the coordinator.

use serde::{Deserialize, Serialize};

use crate::memory::core::graph::{Entity, Fact, GraphHit};
use crate::memory::core::record::MemoryRecord;
use crate::memory::storage::vector_store::VectorHit;

/// Which store produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Vector similarity search.
    Semantic,
    /// Graph keyword search.
    Graph,
}

/// Payload of a search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    /// A semantic memory record.
    Memory(MemoryRecord),
    /// A graph entity.
    Entity(Entity),
    /// A graph fact.
    Fact(Fact),
}

/// Scored, source-labelled search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Producing store.
    pub source: ResultSource,
    /// Similarity, rerank or keyword score.
    pub score: f64,
    /// The matched element.
    pub payload: ResultPayload,
}

impl SearchResult {
    /// Result from a vector hit.
    #[must_use]
    pub fn semantic(hit: VectorHit) -> Self {
        Self {
            source: ResultSource::Semantic,
            score: hit.score,
            payload: ResultPayload::Memory(hit.record),
        }
    }

    /// Result from a scored graph hit.
    #[must_use]
    pub fn graph(score: f64, hit: GraphHit) -> Self {
        let payload = match hit {
            GraphHit::Entity(entity) => ResultPayload::Entity(entity),
            GraphHit::Fact(fact) => ResultPayload::Fact(fact),
        };
        Self {
            source: ResultSource::Graph,
            score,
            payload,
        }
    }

    /// The memory record, for semantic results.
    #[must_use]
    pub const fn memory(&self) -> Option<&MemoryRecord> {
        match &self.payload {
            ResultPayload::Memory(record) => Some(record),
            _ => None,
        }
    }
}
