//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::memory::core::config::HybridConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::embedding::embedder::{Embedder, OllamaEmbedder};
use crate::memory::engine::coordinator::HybridCoordinator;
use crate::memory::engine::graph_memory::GraphStore;
use crate::memory::engine::vector_memory::VectorStore;
use crate::memory::retrieval::rerank::{CompletionReranker, Reranker};
use crate::memory::storage::{InMemoryGraphBackend, InMemoryVectorBackend, Neo4jBackend, QdrantBackend};

/// Shared application state.
pub struct AppState {
    /// Hybrid memory behind every tool route.
    pub memory: HybridCoordinator,
    /// `top_k` used when a tool call omits it.
    pub default_top_k: usize,
}

impl AppState {
    /// Wrap an assembled coordinator.
    #[must_use]
    pub fn new(config: &HybridConfig, memory: HybridCoordinator) -> Arc<Self> {
        Arc::new(Self {
            memory,
            default_top_k: config.retrieval.default_top_k,
        })
    }

    /// Connect Qdrant, Neo4j, Ollama and the optional reranker, then prepare
    /// the collection and graph schema.
    ///
    /// # Errors
    /// Returns an error if a client cannot be built or a backend is
    /// unreachable during initialization.
    pub async fn connect(config: &HybridConfig) -> MemoryResult<Arc<Self>> {
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let vector = VectorStore::new(config, Arc::new(QdrantBackend::new(&config.vector)?), embedder)?;
        let graph = GraphStore::new(config, Arc::new(Neo4jBackend::new(&config.graph)?));
        let reranker: Option<Arc<dyn Reranker>> = if config.reranker.enabled {
            Some(Arc::new(CompletionReranker::new(&config.reranker)?))
        } else {
            None
        };

        let memory = HybridCoordinator::new(config, Arc::new(vector), Arc::new(graph), reranker);
        memory.init().await?;
        Ok(Self::new(config, memory))
    }

    /// State over in-memory backends, for local runs without services.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the embedder dimension disagrees with the
    /// configuration.
    pub fn in_memory(config: &HybridConfig, embedder: Arc<dyn Embedder>) -> MemoryResult<Arc<Self>> {
        let backend = Arc::new(InMemoryVectorBackend::new(config.vector.collection.clone()));
        let vector = VectorStore::new(config, backend, embedder)?;
        let graph = GraphStore::new(config, Arc::new(InMemoryGraphBackend::new()));
        let memory = HybridCoordinator::new(config, Arc::new(vector), Arc::new(graph), None);
        Ok(Self::new(config, memory))
    }
}
