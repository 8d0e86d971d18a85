//! Memory engine: semantic store, graph store and the hybrid coordinator.

pub mod budget;
pub mod coordinator;
pub mod graph_memory;
pub mod record;
pub mod results;
pub mod vector_memory;

pub use coordinator::{HybridCoordinator, HybridStats, RecallResult, SemanticResults};
pub use graph_memory::GraphStore;
pub use record::{
    EntitySpec, FactSpec, RecordReport, RecordRequest, RecordStatus, RelationshipSpec, StepOutcome,
};
pub use results::{ResultPayload, ResultSource, SearchResult};
pub use vector_memory::{Superseded, VectorStats, VectorStore};
