//! Core memory types and identifiers.

pub mod config;
pub mod errors;
pub mod graph;
pub mod ids;
pub mod metadata;
pub mod record;

pub use config::{
    DedupeConfig, EmbeddingConfig, GraphConfig, HybridConfig, RerankerConfig, RetrievalConfig,
    ServerConfig, TimeoutConfig, VectorConfig,
};
pub use errors::{ErrorKind, ErrorReport, MemoryError, MemoryResult};
pub use graph::{
    Direction, Entity, EntityView, Fact, FactInput, GraphHit, GraphStats, RelatedEntity,
    Relationship, TraversalQuery,
};
pub use ids::{EntityKey, MemoryId};
pub use metadata::{Metadata, MetadataValue};
pub use record::MemoryRecord;
