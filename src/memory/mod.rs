//! Hybrid memory: semantic recall over a vector store plus a knowledge graph.
//!
//! The subsystem is organized into:
//! - `core`: Configuration, errors, identifiers, metadata and data model
//! - `embedding`: Embedding model abstraction and Ollama implementation
//! - `ingest`: Text normalization and near-duplicate detection
//! - `storage`: Vector and graph backends (Qdrant, Neo4j, in-memory)
//! - `retrieval`: Filters, ranking helpers and the optional reranker
//! - `engine`: Semantic store, graph store and the hybrid coordinator

pub mod core;
pub mod embedding;
pub mod engine;
pub mod ingest;
pub mod retrieval;
pub mod storage;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types for convenience
pub use core::{
    Direction, EntityKey, EntityView, ErrorKind, ErrorReport, Fact, HybridConfig, MemoryError,
    MemoryId, MemoryRecord, MemoryResult, Metadata, MetadataValue, RelatedEntity, Relationship,
};
pub use core::graph::Entity;
pub use embedding::{EmbedFuture, Embedder, OllamaEmbedder};
pub use engine::{
    GraphStore, HybridCoordinator, HybridStats, RecallResult, RecordReport, RecordRequest,
    RecordStatus, SearchResult, StepOutcome, VectorStore,
};
pub use retrieval::{
    CompletionReranker, MetadataFilter, Reranker, SearchOptions, sort_by_score_then_recency,
};
pub use storage::{
    GraphBackend, GraphScope, InMemoryGraphBackend, InMemoryVectorBackend, Neo4jBackend,
    QdrantBackend, StoreFuture, VectorBackend,
};
