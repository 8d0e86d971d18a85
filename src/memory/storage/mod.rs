//! Storage backends for memory records and the knowledge graph.

pub mod graph_store;
pub mod in_memory;
pub mod in_memory_graph;
pub mod neo4j;
pub mod qdrant;
pub mod vector_store;

pub use graph_store::{GraphBackend, GraphScope, GraphTextQuery};
pub use in_memory::InMemoryVectorBackend;
pub use in_memory_graph::InMemoryGraphBackend;
pub use neo4j::Neo4jBackend;
pub use qdrant::QdrantBackend;
pub use vector_store::{StoreFuture, VectorBackend, VectorHit, VectorQuery};
