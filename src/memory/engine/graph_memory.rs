//! Knowledge graph memory: entities, relationships and facts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::memory::core::config::HybridConfig;
use crate::memory::core::errors::{ErrorKind, MemoryError, MemoryResult};
use crate::memory::core::graph::{
    Direction, Entity, EntityView, Fact, FactInput, GraphHit, GraphStats, RelatedEntity,
    Relationship, TraversalQuery, normalize_relation_type,
};
use crate::memory::core::ids::EntityKey;
use crate::memory::core::metadata::Metadata;
use crate::memory::engine::budget::bounded;
use crate::memory::engine::results::SearchResult;
use crate::memory::retrieval::ranking::{KeywordQuery, sort_by_score_then_recency};
use crate::memory::storage::graph_store::{GraphBackend, GraphScope, GraphTextQuery};

/// Candidates fetched per requested result before keyword scoring.
const CANDIDATE_FACTOR: usize = 10;

/// Graph memory over a [`GraphBackend`].
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    auto_create: bool,
    max_hops_limit: usize,
    call_timeout: Duration,
}

impl GraphStore {
    /// Create a store.
    #[must_use]
    pub fn new(config: &HybridConfig, backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            auto_create: config.graph.auto_create_endpoints,
            max_hops_limit: config.retrieval.max_hops_limit.max(1),
            call_timeout: config.call_timeout(),
        }
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Apply backend indexes and constraints.
    ///
    /// # Errors
    /// Returns `Store` or `Timeout` on failure.
    pub async fn init(&self) -> MemoryResult<()> {
        bounded(
            "graph_init",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.ensure_schema(),
        )
        .await
    }

    /// Upsert an entity keyed by `(name, type)`, merging properties.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty name or type or bad properties,
    /// `Store` when the backend fails.
    pub async fn add_entity(
        &self,
        name: &str,
        entity_type: &str,
        properties: Metadata,
    ) -> MemoryResult<Entity> {
        let key = EntityKey::new(name, entity_type)?;
        properties.validate()?;
        let entity = bounded(
            "graph_upsert_node",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.upsert_node(Entity::new(key, properties)),
        )
        .await?;
        info!(entity = %entity.key(), "upserted entity");
        Ok(entity)
    }

    /// Upsert the `(source, target, type)` relationship.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a malformed type, `NotFound` for a missing
    /// endpoint when auto-creation is off, `Store` when the backend fails.
    pub async fn add_relationship(
        &self,
        source: EntityKey,
        target: EntityKey,
        relation_type: &str,
        properties: Metadata,
    ) -> MemoryResult<Relationship> {
        let source = source.validated()?;
        let target = target.validated()?;
        let relation_type = normalize_relation_type(relation_type)?;
        properties.validate()?;

        let edge = Relationship::new(source, target, relation_type, properties);
        let edge = bounded(
            "graph_upsert_edge",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.upsert_edge(edge, self.auto_create),
        )
        .await?;
        info!(
            source = %edge.source,
            target = %edge.target,
            relation = %edge.relation_type,
            "upserted relationship"
        );
        Ok(edge)
    }

    /// Upsert a fact keyed by its exact triple.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty parts or confidence outside `[0, 1]`,
    /// `Store` when the backend fails.
    pub async fn add_fact(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        confidence: Option<f64>,
        context: Option<String>,
    ) -> MemoryResult<Fact> {
        let input = FactInput::new(subject, predicate, object, confidence, context)?;
        let fact = bounded(
            "graph_upsert_triple",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.upsert_triple(input.into_fact()),
        )
        .await?;
        info!(subject = %fact.subject, predicate = %fact.predicate, "upserted fact");
        Ok(fact)
    }

    /// Entity with its outgoing and incoming relationships.
    ///
    /// # Errors
    /// Returns `NotFound` if absent, `Store` when the backend fails.
    pub async fn get_entity(&self, key: EntityKey) -> MemoryResult<EntityView> {
        let key = key.validated()?;
        let view = bounded(
            "graph_get_entity",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.get_entity_view(key.clone()),
        )
        .await?;
        view.ok_or_else(|| MemoryError::NotFound(format!("entity {key}")))
    }

    /// Facts about `subject`, most recent first.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty subject, `Store` when the backend
    /// fails.
    pub async fn get_facts(&self, subject: &str, limit: usize) -> MemoryResult<Vec<Fact>> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(MemoryError::InvalidInput(
                "fact subject must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        bounded(
            "graph_get_facts",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.get_triples(subject.to_string(), limit),
        )
        .await
    }

    /// Keyword search over entities and facts.
    ///
    /// # Errors
    /// Returns `Store` when the backend fails.
    pub async fn search(&self, query: &str, limit: usize) -> MemoryResult<Vec<SearchResult>> {
        self.search_scoped(query, limit, GraphScope::Both, None).await
    }

    /// Keyword search restricted to entities, facts or both, and optionally
    /// to entities of one type (which leaves facts out).
    ///
    /// Scores are match breadth in `[0, 1]`; results are ordered by score,
    /// then most recent first. Queries without terms return nothing.
    ///
    /// # Errors
    /// Returns `Store` when the backend fails.
    pub async fn search_scoped(
        &self,
        query: &str,
        limit: usize,
        scope: GraphScope,
        entity_type: Option<&str>,
    ) -> MemoryResult<Vec<SearchResult>> {
        let Some(keywords) = KeywordQuery::parse(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let entity_type = entity_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let text_query = GraphTextQuery {
            keywords,
            scope,
            entity_type,
            candidate_limit: limit.saturating_mul(CANDIDATE_FACTOR),
        };
        let candidates = bounded(
            "graph_search",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.query_text(text_query.clone()),
        )
        .await?;
        let candidate_count = candidates.len();

        let mut scored: Vec<(f64, GraphHit)> = candidates
            .into_iter()
            .filter(|hit| match hit {
                GraphHit::Entity(e) => text_query.accepts(e),
                GraphHit::Fact(_) => text_query.wants_facts(),
            })
            .filter_map(|hit| {
                let score = text_query.score(&hit);
                (score > 0.0).then_some((score, hit))
            })
            .collect();
        sort_by_score_then_recency(&mut scored, |(score, hit)| (*score, hit.recency()));
        scored.truncate(limit);

        debug!(
            candidates = candidate_count,
            results = scored.len(),
            scope = ?scope,
            "graph search complete"
        );
        Ok(scored
            .into_iter()
            .map(|(score, hit)| SearchResult::graph(score, hit))
            .collect())
    }

    /// Entities reachable from `key` within `max_hops`, in BFS order.
    ///
    /// `max_hops` defaults to 1 and is clamped to `[1, max_hops_limit]`.
    ///
    /// # Errors
    /// Returns `NotFound` if the origin is absent, `InvalidInput` for a
    /// malformed relationship type, `Store` when the backend fails.
    pub async fn get_related(
        &self,
        key: EntityKey,
        max_hops: Option<usize>,
        relation_types: &[String],
        direction: Direction,
    ) -> MemoryResult<Vec<RelatedEntity>> {
        let origin = key.validated()?;
        let relation_types = relation_types
            .iter()
            .map(|t| normalize_relation_type(t))
            .collect::<MemoryResult<Vec<_>>>()?;
        let max_hops = max_hops.unwrap_or(1).clamp(1, self.max_hops_limit);

        let query = TraversalQuery {
            origin,
            max_hops,
            relation_types,
            direction,
        };
        let related = bounded(
            "graph_traverse",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.bfs(query),
        )
        .await?;
        debug!(results = related.len(), max_hops, %direction, "graph traversal complete");
        Ok(related)
    }

    /// Entity, relationship and fact counts.
    ///
    /// # Errors
    /// Returns `Store` when the backend fails.
    pub async fn stats(&self) -> MemoryResult<GraphStats> {
        bounded(
            "graph_stats",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.stats(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::metadata::MetadataValue;
    use crate::memory::engine::results::ResultPayload;
    use crate::memory::storage::in_memory_graph::InMemoryGraphBackend;
    use crate::memory::testing::test_config;

    fn store() -> GraphStore {
        GraphStore::new(&test_config(), Arc::new(InMemoryGraphBackend::new()))
    }

    fn key(name: &str) -> EntityKey {
        EntityKey::new(name, "Person").unwrap()
    }

    #[tokio::test]
    async fn test_entity_upsert_merges_properties() {
        let graph = store();
        graph
            .add_entity("Alice", "Person", Metadata::new().with("role", "eng"))
            .await
            .unwrap();
        let merged = graph
            .add_entity(
                "Alice",
                "Person",
                Metadata::new().with("role", "lead").with("team", "core"),
            )
            .await
            .unwrap();

        assert_eq!(merged.properties.get("role"), Some(&MetadataValue::from("lead")));
        assert_eq!(merged.properties.get("team"), Some(&MetadataValue::from("core")));
        assert_eq!(graph.stats().await.unwrap().entities, 1);
    }

    #[tokio::test]
    async fn test_relationship_type_is_validated_and_normalized() {
        let graph = store();
        let edge = graph
            .add_relationship(key("Alice"), key("Bob"), "works_with", Metadata::new())
            .await
            .unwrap();
        assert_eq!(edge.relation_type, "WORKS_WITH");

        let err = graph
            .add_relationship(key("Alice"), key("Bob"), "works with", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_strict_endpoints_name_the_missing_entity() {
        let mut config = test_config();
        config.graph.auto_create_endpoints = false;
        let graph = GraphStore::new(&config, Arc::new(InMemoryGraphBackend::new()));
        graph.add_entity("Alice", "Person", Metadata::new()).await.unwrap();

        let err = graph
            .add_relationship(key("Alice"), key("Bob"), "KNOWS", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, MemoryError::NotFound(msg) if msg.contains("Bob")));
    }

    #[tokio::test]
    async fn test_fact_upsert_refreshes_confidence() {
        let graph = store();
        graph
            .add_fact("Alice", "works_at", "Acme", Some(0.5), None)
            .await
            .unwrap();
        graph
            .add_fact("Alice", "works_at", "Acme", Some(0.9), Some("hr sync".into()))
            .await
            .unwrap();
        let facts = graph.get_facts("Alice", 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].confidence, Some(0.9));
        assert_eq!(facts[0].context.as_deref(), Some("hr sync"));

        assert!(
            graph
                .add_fact("Alice", "likes", "tea", Some(1.5), None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_get_entity_view_and_not_found() {
        let graph = store();
        graph
            .add_relationship(key("Alice"), key("Bob"), "KNOWS", Metadata::new())
            .await
            .unwrap();
        let view = graph.get_entity(key("Bob")).await.unwrap();
        assert!(view.outgoing.is_empty());
        assert_eq!(view.incoming.len(), 1);

        let err = graph.get_entity(key("Carol")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_scores_by_match_breadth() {
        let graph = store();
        graph.add_entity("Alice Smith", "Person", Metadata::new()).await.unwrap();
        graph.add_entity("Alice", "Person", Metadata::new()).await.unwrap();
        graph
            .add_fact("Bob", "lives_in", "Paris", None, None)
            .await
            .unwrap();

        let results = graph.search("alice smith", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(matches!(&results[0].payload, ResultPayload::Entity(e) if e.name == "Alice Smith"));
        assert!((results[1].score - 0.5 / 1.5).abs() < 1e-9);

        let facts_only = graph
            .search_scoped("paris alice", 10, GraphScope::Facts, None)
            .await
            .unwrap();
        assert_eq!(facts_only.len(), 1);
        assert!(matches!(facts_only[0].payload, ResultPayload::Fact(_)));

        assert!(graph.search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_before_capping_candidates() {
        let graph = store();
        for n in 0..200 {
            graph
                .add_entity(&format!("project {n}"), "Project", Metadata::new())
                .await
                .unwrap();
        }
        graph
            .add_entity("Apollo project", "Project", Metadata::new())
            .await
            .unwrap();

        let results = graph.search("apollo project", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(matches!(&results[0].payload, ResultPayload::Entity(e) if e.name == "Apollo project"));
    }

    #[tokio::test]
    async fn test_search_restricted_to_entity_type() {
        let graph = store();
        graph.add_entity("Mercury", "Planet", Metadata::new()).await.unwrap();
        graph.add_entity("Mercury", "Element", Metadata::new()).await.unwrap();
        graph
            .add_fact("Mercury", "orbits", "Sun", None, None)
            .await
            .unwrap();

        let planets = graph
            .search_scoped("mercury", 10, GraphScope::Both, Some("Planet"))
            .await
            .unwrap();
        assert_eq!(planets.len(), 1);
        assert!(
            matches!(&planets[0].payload, ResultPayload::Entity(e) if e.entity_type == "Planet")
        );

        let everything = graph
            .search_scoped("mercury", 10, GraphScope::Both, None)
            .await
            .unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_traversal_terminates_on_cycle() {
        let graph = store();
        for (from, to) in [("A", "B"), ("B", "C"), ("C", "A")] {
            graph
                .add_relationship(key(from), key(to), "NEXT", Metadata::new())
                .await
                .unwrap();
        }
        let related = graph
            .get_related(key("A"), Some(5), &[], Direction::Outgoing)
            .await
            .unwrap();
        let reached: Vec<(&str, usize)> = related
            .iter()
            .map(|r| (r.entity.name.as_str(), r.hops))
            .collect();
        assert_eq!(reached, vec![("B", 1), ("C", 2)]);
        assert_eq!(related[1].path, ["NEXT", "NEXT"]);
    }

    #[tokio::test]
    async fn test_get_related_defaults_and_clamps_hops() {
        let graph = store();
        for (from, to) in [("A", "B"), ("B", "C")] {
            graph
                .add_relationship(key(from), key(to), "NEXT", Metadata::new())
                .await
                .unwrap();
        }
        let one_hop = graph
            .get_related(key("A"), None, &[], Direction::Both)
            .await
            .unwrap();
        assert_eq!(one_hop.len(), 1);

        let clamped = graph
            .get_related(key("A"), Some(0), &["next".to_string()], Direction::Both)
            .await
            .unwrap();
        assert_eq!(clamped.len(), 1);

        let missing = graph
            .get_related(key("Z"), Some(2), &[], Direction::Both)
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
