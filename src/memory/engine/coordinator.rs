//! Hybrid coordinator: concurrent recall and multi-step record.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::memory::core::config::HybridConfig;
use crate::memory::core::errors::{ErrorKind, ErrorReport, MemoryError, MemoryResult};
use crate::memory::core::graph::GraphStats;
use crate::memory::core::record::clean_text;
use crate::memory::engine::budget::{bounded, until};
use crate::memory::engine::graph_memory::GraphStore;
use crate::memory::engine::record::{RecordReport, RecordRequest, RecordStatus, StepOutcome};
use crate::memory::engine::results::SearchResult;
use crate::memory::engine::vector_memory::{VectorStats, VectorStore};
use crate::memory::retrieval::rerank::{RerankScore, Reranker};
use crate::memory::retrieval::search::SearchOptions;
use crate::memory::storage::vector_store::VectorHit;

/// Semantic results and whether a reranker ordered them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticResults {
    /// Results, best first.
    pub results: Vec<SearchResult>,
    /// Whether scores are rerank scores.
    pub reranked: bool,
}

/// Outcome of a hybrid recall.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallResult {
    /// Semantic branch results.
    pub semantic: Vec<SearchResult>,
    /// Graph branch results.
    pub graph: Vec<SearchResult>,
    /// Semantic branch failure, if any.
    pub semantic_error: Option<ErrorReport>,
    /// Graph branch failure, if any.
    pub graph_error: Option<ErrorReport>,
    /// Whether the semantic branch was reranked.
    pub reranked: bool,
}

/// Combined statistics of both stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridStats {
    /// Semantic store statistics.
    pub vector: VectorStats,
    /// Graph statistics, absent when the graph is unavailable.
    pub graph: Option<GraphStats>,
    /// Graph failure, if any.
    pub graph_error: Option<ErrorReport>,
    /// Whether a reranker is configured.
    pub reranker_enabled: bool,
}

/// Fronts the semantic store, the graph store and the optional reranker.
pub struct HybridCoordinator {
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    reranker: Option<Arc<dyn Reranker>>,
    candidate_multiplier: usize,
    call_timeout: Duration,
    recall_timeout: Duration,
}

impl HybridCoordinator {
    /// Assemble a coordinator.
    #[must_use]
    pub fn new(
        config: &HybridConfig,
        vector: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            vector,
            graph,
            reranker,
            candidate_multiplier: config.reranker.candidate_multiplier.max(1),
            call_timeout: config.call_timeout(),
            recall_timeout: config.recall_timeout(),
        }
    }

    /// Semantic store.
    #[must_use]
    pub fn vector(&self) -> &Arc<VectorStore> {
        &self.vector
    }

    /// Graph store.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// Whether a reranker is configured.
    #[must_use]
    pub const fn reranker_enabled(&self) -> bool {
        self.reranker.is_some()
    }

    /// Prepare both backends.
    ///
    /// # Errors
    /// Returns the first backend initialization failure.
    pub async fn init(&self) -> MemoryResult<()> {
        self.vector.init().await?;
        self.graph.init().await?;
        info!(
            graph_backend = self.graph.backend_name(),
            reranker = self.reranker.is_some(),
            "hybrid memory ready"
        );
        Ok(())
    }

    /// Semantic search, reranked when asked and a reranker is configured.
    ///
    /// Rerank failures fall back to the plain search ordering.
    ///
    /// # Errors
    /// Returns `InvalidInput`, `Embedding` or `Store` from the vector search.
    pub async fn search_memory(
        &self,
        query: &str,
        options: &SearchOptions,
        rerank: bool,
    ) -> MemoryResult<SemanticResults> {
        let reranker = self.reranker.as_ref().filter(|_| rerank && options.top_k > 0);
        let Some(reranker) = reranker else {
            let hits = self.vector.search(query, options).await?;
            return Ok(SemanticResults {
                results: hits.into_iter().map(SearchResult::semantic).collect(),
                reranked: false,
            });
        };

        let wide = SearchOptions {
            top_k: options.top_k.saturating_mul(self.candidate_multiplier),
            ..options.clone()
        };
        let mut candidates = self.vector.search(query, &wide).await?;
        match self.rerank(&**reranker, query, &candidates).await {
            Ok(scores) => {
                let results = scores
                    .into_iter()
                    .filter_map(|RerankScore { index, score }| {
                        candidates.get(index).map(|hit| SearchResult {
                            score,
                            ..SearchResult::semantic(hit.clone())
                        })
                    })
                    .take(options.top_k)
                    .collect();
                Ok(SemanticResults {
                    results,
                    reranked: true,
                })
            }
            Err(err) => {
                warn!(error = %err, candidates = candidates.len(), "rerank failed, keeping similarity order");
                candidates.truncate(options.top_k);
                Ok(SemanticResults {
                    results: candidates.into_iter().map(SearchResult::semantic).collect(),
                    reranked: false,
                })
            }
        }
    }

    async fn rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        candidates: &[VectorHit],
    ) -> MemoryResult<Vec<RerankScore>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = candidates.iter().map(|hit| hit.record.text.clone()).collect();
        bounded(
            "rerank",
            ErrorKind::Rerank,
            self.call_timeout,
            reranker.rerank(query, &texts),
        )
        .await
    }

    /// Query both stores concurrently under one deadline.
    ///
    /// A failing branch is reported in its `*_error` field.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty query and `RecallFailed` when both
    /// branches fail.
    pub async fn recall(&self, query: &str, top_k: usize) -> MemoryResult<RecallResult> {
        let query = clean_text(query)?;
        if top_k == 0 {
            return Ok(RecallResult::default());
        }

        let deadline = Instant::now() + self.recall_timeout;
        let options = SearchOptions::top_k(top_k);
        let semantic = until(
            "recall_semantic",
            ErrorKind::Store,
            deadline,
            self.recall_timeout,
            self.search_memory(query, &options, true),
        );
        let graph = until(
            "recall_graph",
            ErrorKind::Store,
            deadline,
            self.recall_timeout,
            self.graph.search(query, top_k),
        );
        let (semantic, graph) = tokio::join!(semantic, graph);

        let mut result = RecallResult::default();
        match semantic {
            Ok(found) => {
                result.semantic = found.results;
                result.reranked = found.reranked;
            }
            Err(err) => {
                warn!(error = %err, "recall semantic branch failed");
                result.semantic_error = Some(err.report());
            }
        }
        match graph {
            Ok(found) => result.graph = found,
            Err(err) => {
                warn!(error = %err, "recall graph branch failed");
                result.graph_error = Some(err.report());
            }
        }

        if let (Some(semantic), Some(graph)) = (&result.semantic_error, &result.graph_error) {
            return Err(MemoryError::RecallFailed {
                semantic: semantic.clone(),
                graph: graph.clone(),
            });
        }
        debug!(
            semantic = result.semantic.len(),
            graph = result.graph.len(),
            reranked = result.reranked,
            "recall complete"
        );
        Ok(result)
    }

    /// Write a memory, then entities, relationships and facts, in order.
    ///
    /// Every step is attempted; nothing is rolled back.
    ///
    /// # Errors
    /// Returns `RecordFailed` with the report when every step failed.
    pub async fn record(&self, request: RecordRequest) -> MemoryResult<RecordReport> {
        let RecordRequest {
            text,
            metadata,
            entities,
            relationships,
            facts,
        } = request;

        let memory = StepOutcome::from(self.vector.add(&text, metadata).await);

        let mut entity_steps = Vec::with_capacity(entities.len());
        for spec in entities {
            let outcome = self
                .graph
                .add_entity(&spec.name, &spec.entity_type, spec.properties)
                .await;
            entity_steps.push(StepOutcome::from(outcome));
        }

        let mut relationship_steps = Vec::with_capacity(relationships.len());
        for spec in relationships {
            let outcome = self
                .graph
                .add_relationship(spec.source, spec.target, &spec.relation_type, spec.properties)
                .await;
            relationship_steps.push(StepOutcome::from(outcome));
        }

        let mut fact_steps = Vec::with_capacity(facts.len());
        for spec in facts {
            let outcome = self
                .graph
                .add_fact(
                    &spec.subject,
                    &spec.predicate,
                    &spec.object,
                    spec.confidence,
                    spec.context,
                )
                .await;
            fact_steps.push(StepOutcome::from(outcome));
        }

        let report = RecordReport::new(memory, entity_steps, relationship_steps, fact_steps);
        match report.status {
            RecordStatus::Complete => info!(summary = %report.summary(), "record complete"),
            RecordStatus::Partial => warn!(summary = %report.summary(), "record partially failed"),
            RecordStatus::Failed => {
                warn!(summary = %report.summary(), "record failed");
                return Err(MemoryError::RecordFailed(Box::new(report)));
            }
        }
        Ok(report)
    }

    /// Statistics of both stores; a graph failure is reported, not raised.
    ///
    /// # Errors
    /// Returns `Store` when the vector store fails.
    pub async fn stats(&self) -> MemoryResult<HybridStats> {
        let (vector, graph) = tokio::join!(self.vector.stats(), self.graph.stats());
        let vector = vector?;
        let (graph, graph_error) = match graph {
            Ok(stats) => (Some(stats), None),
            Err(err) => {
                warn!(error = %err, "graph stats unavailable");
                (None, Some(err.report()))
            }
        };
        Ok(HybridStats {
            vector,
            graph,
            graph_error,
            reranker_enabled: self.reranker.is_some(),
        })
    }
}
