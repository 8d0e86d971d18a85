//! Deterministic fakes shared by unit tests.

#![allow(
    dead_code,
    missing_docs,
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::missing_panics_doc
)]

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use rig::embeddings::Embedding;

use crate::memory::core::config::HybridConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::graph::{
    Entity, EntityView, Fact, GraphHit, GraphStats, RelatedEntity, Relationship, TraversalQuery,
};
use crate::memory::core::ids::{EntityKey, MemoryId};
use crate::memory::core::record::MemoryRecord;
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};
use crate::memory::engine::coordinator::HybridCoordinator;
use crate::memory::engine::graph_memory::GraphStore;
use crate::memory::engine::vector_memory::VectorStore;
use crate::memory::ingest::dedupe::normalize_text;
use crate::memory::retrieval::rerank::{RerankFuture, RerankScore, Reranker, sort_scores};
use crate::memory::retrieval::search::MetadataFilter;
use crate::memory::storage::graph_store::{GraphBackend, GraphTextQuery};
use crate::memory::storage::in_memory::InMemoryVectorBackend;
use crate::memory::storage::in_memory_graph::InMemoryGraphBackend;
use crate::memory::storage::vector_store::{StoreFuture, VectorBackend, VectorHit, VectorQuery};

/// Embedding dimension used across tests.
pub const TEST_DIMS: usize = 64;

/// Default config sized for [`TEST_DIMS`] with short timeouts.
pub fn test_config() -> HybridConfig {
    let mut config = HybridConfig::default();
    config.embedding.ndims = TEST_DIMS;
    config.timeouts.call_ms = 2_000;
    config.timeouts.recall_ms = 5_000;
    config
}

/// Unit vector whose cosine similarity with `unit(1.0)` is `similarity`.
pub fn unit(similarity: f64) -> Vec<f64> {
    let mut vector = vec![0.0; TEST_DIMS];
    vector[0] = similarity;
    vector[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    vector
}

fn hashed(text: &str) -> Vec<f64> {
    let mut hasher = DefaultHasher::new();
    normalize_text(text).hash(&mut hasher);
    let mut state = hasher.finish() | 1;
    (0..TEST_DIMS)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 11) as f64 / (1_u64 << 53) as f64).mul_add(2.0, -1.0)
        })
        .collect()
}

/// Embedder returning registered vectors, or a stable pseudo-random one.
///
/// Keys are normalized unless the embedder is case-sensitive, which models a
/// real model giving different vectors to texts differing only in case.
#[derive(Default)]
pub struct KeyedEmbedder {
    vectors: HashMap<String, Vec<f64>>,
    delay: Option<Duration>,
    case_sensitive: bool,
}

impl KeyedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_sensitive() -> Self {
        Self {
            case_sensitive: true,
            ..Self::default()
        }
    }

    fn key(&self, text: &str) -> String {
        if self.case_sensitive {
            text.trim().to_string()
        } else {
            normalize_text(text)
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f64>) -> Self {
        let key = self.key(text);
        self.vectors.insert(key, vector);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Embedder for KeyedEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let document = text.to_string();
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let vec = self
                .vectors
                .get(&self.key(&document))
                .cloned()
                .unwrap_or_else(|| hashed(&document));
            Ok(Embedding { document, vec })
        })
    }

    fn ndims(&self) -> usize {
        TEST_DIMS
    }
}

/// Embedder that always fails.
#[derive(Default)]
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed_text(&self, _text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        Box::pin(async { Err(MemoryError::Embedding("connection refused".to_string())) })
    }

    fn ndims(&self) -> usize {
        TEST_DIMS
    }
}

fn vector_down() -> MemoryError {
    MemoryError::store("failing_vector", "connection refused")
}

/// Vector backend that always fails.
pub struct FailingVectorBackend;

impl VectorBackend for FailingVectorBackend {
    fn name(&self) -> &'static str {
        "failing_vector"
    }

    fn collection(&self) -> &str {
        "failing"
    }

    fn ensure_collection(&self, _ndims: usize) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async { Err(vector_down()) })
    }

    fn upsert(&self, _record: MemoryRecord) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async { Err(vector_down()) })
    }

    fn search(&self, _query: VectorQuery) -> StoreFuture<'_, MemoryResult<Vec<VectorHit>>> {
        Box::pin(async { Err(vector_down()) })
    }

    fn get(&self, _id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>> {
        Box::pin(async { Err(vector_down()) })
    }

    fn recent(
        &self,
        _limit: usize,
        _filter: MetadataFilter,
    ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async { Err(vector_down()) })
    }

    fn count(&self) -> StoreFuture<'_, MemoryResult<u64>> {
        Box::pin(async { Err(vector_down()) })
    }
}

fn graph_down() -> MemoryError {
    MemoryError::store("failing_graph", "connection refused")
}

/// In-memory graph that fails every call, or only facts about one subject.
/// Every call can also be slowed down by a fixed delay.
#[derive(Default)]
pub struct FailingGraphBackend {
    inner: InMemoryGraphBackend,
    fail_all: bool,
    fail_fact_subject: Option<String>,
    delay: Option<Duration>,
}

impl FailingGraphBackend {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing_all() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_fact_subject(subject: &str) -> Self {
        Self {
            fail_fact_subject: Some(subject.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn guard<'a, T: Send + 'a>(
        &self,
        call: StoreFuture<'a, MemoryResult<T>>,
    ) -> StoreFuture<'a, MemoryResult<T>> {
        let delay = self.delay;
        let fail_all = self.fail_all;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail_all { Err(graph_down()) } else { call.await }
        })
    }
}

impl GraphBackend for FailingGraphBackend {
    fn name(&self) -> &'static str {
        "failing_graph"
    }

    fn ensure_schema(&self) -> StoreFuture<'_, MemoryResult<()>> {
        self.guard(self.inner.ensure_schema())
    }

    fn upsert_node(&self, entity: Entity) -> StoreFuture<'_, MemoryResult<Entity>> {
        self.guard(self.inner.upsert_node(entity))
    }

    fn upsert_edge(
        &self,
        edge: Relationship,
        auto_create: bool,
    ) -> StoreFuture<'_, MemoryResult<Relationship>> {
        self.guard(self.inner.upsert_edge(edge, auto_create))
    }

    fn get_entity_view(&self, key: EntityKey) -> StoreFuture<'_, MemoryResult<Option<EntityView>>> {
        self.guard(self.inner.get_entity_view(key))
    }

    fn query_text(&self, query: GraphTextQuery) -> StoreFuture<'_, MemoryResult<Vec<GraphHit>>> {
        self.guard(self.inner.query_text(query))
    }

    fn bfs(&self, query: TraversalQuery) -> StoreFuture<'_, MemoryResult<Vec<RelatedEntity>>> {
        self.guard(self.inner.bfs(query))
    }

    fn upsert_triple(&self, fact: Fact) -> StoreFuture<'_, MemoryResult<Fact>> {
        if self.fail_fact_subject.as_deref() == Some(fact.subject.as_str()) {
            return Box::pin(async { Err(graph_down()) });
        }
        self.guard(self.inner.upsert_triple(fact))
    }

    fn get_triples(&self, subject: String, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<Fact>>> {
        self.guard(self.inner.get_triples(subject, limit))
    }

    fn stats(&self) -> StoreFuture<'_, MemoryResult<GraphStats>> {
        self.guard(self.inner.stats())
    }
}

/// Reranker that prefers later candidates.
pub struct ReverseReranker;

impl Reranker for ReverseReranker {
    fn rerank<'a>(
        &'a self,
        _query: &'a str,
        candidates: &'a [String],
    ) -> RerankFuture<'a, MemoryResult<Vec<RerankScore>>> {
        Box::pin(async move {
            let total = candidates.len() as f64;
            let mut scores: Vec<RerankScore> = (0..candidates.len())
                .map(|index| RerankScore {
                    index,
                    score: (index + 1) as f64 / total,
                })
                .collect();
            sort_scores(&mut scores);
            Ok(scores)
        })
    }
}

/// Reranker whose endpoint is unreachable.
pub struct FailingReranker;

impl Reranker for FailingReranker {
    fn rerank<'a>(
        &'a self,
        _query: &'a str,
        _candidates: &'a [String],
    ) -> RerankFuture<'a, MemoryResult<Vec<RerankScore>>> {
        Box::pin(async { Err(MemoryError::Rerank("connection refused".to_string())) })
    }
}

/// Coordinator over an in-memory vector backend and the given fakes.
pub fn coordinator_with(
    config: &HybridConfig,
    embedder: impl Embedder + 'static,
    graph: FailingGraphBackend,
    reranker: Option<Arc<dyn Reranker>>,
) -> HybridCoordinator {
    let vector = VectorStore::new(
        config,
        Arc::new(InMemoryVectorBackend::new("test")),
        Arc::new(embedder),
    )
    .unwrap();
    let graph = GraphStore::new(config, Arc::new(graph));
    HybridCoordinator::new(config, Arc::new(vector), Arc::new(graph), reranker)
}

/// [`coordinator_with`] using [`test_config`].
pub fn coordinator(
    embedder: impl Embedder + 'static,
    graph: FailingGraphBackend,
    reranker: Option<Arc<dyn Reranker>>,
) -> HybridCoordinator {
    coordinator_with(&test_config(), embedder, graph, reranker)
}
