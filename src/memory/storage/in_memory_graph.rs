//! Process-local graph backend for tests and local runs.
//!
//! All state sits behind one async lock, so each upsert is atomic.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::RwLock;
use tracing::debug;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::graph::{
    Direction, Entity, EntityView, Fact, GraphHit, GraphStats, RelatedEntity, Relationship,
    TraversalQuery,
};
use crate::memory::core::ids::EntityKey;
use crate::memory::retrieval::ranking::sort_by_score_then_recency;
use crate::memory::storage::graph_store::{GraphBackend, GraphTextQuery};
use crate::memory::storage::vector_store::StoreFuture;

#[derive(Debug, Default)]
struct GraphState {
    entities: HashMap<EntityKey, Entity>,
    edges: Vec<Relationship>,
    facts: Vec<Fact>,
}

impl GraphState {
    fn merge_node(&mut self, entity: Entity) -> Entity {
        let key = entity.key();
        let stored = self
            .entities
            .entry(key)
            .and_modify(|existing| existing.merge(&entity.properties))
            .or_insert(entity);
        stored.clone()
    }

    fn neighbours<'a>(
        &'a self,
        node: &'a EntityKey,
        query: &'a TraversalQuery,
    ) -> impl Iterator<Item = (&'a EntityKey, &'a str)> + 'a {
        self.edges
            .iter()
            .filter(move |edge| {
                query.relation_types.is_empty()
                    || query.relation_types.iter().any(|t| *t == edge.relation_type)
            })
            .filter_map(move |edge| {
                let forward = edge.source == *node
                    && matches!(query.direction, Direction::Outgoing | Direction::Both);
                let backward = edge.target == *node
                    && matches!(query.direction, Direction::Incoming | Direction::Both);
                if forward {
                    Some((&edge.target, edge.relation_type.as_str()))
                } else if backward {
                    Some((&edge.source, edge.relation_type.as_str()))
                } else {
                    None
                }
            })
    }
}

/// Graph backend holding entities, edges and facts in memory.
#[derive(Debug, Default)]
pub struct InMemoryGraphBackend {
    state: RwLock<GraphState>,
}

impl InMemoryGraphBackend {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphBackend for InMemoryGraphBackend {
    fn name(&self) -> &'static str {
        "in_memory_graph"
    }

    fn ensure_schema(&self) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn upsert_node(&self, entity: Entity) -> StoreFuture<'_, MemoryResult<Entity>> {
        Box::pin(async move { Ok(self.state.write().await.merge_node(entity)) })
    }

    fn upsert_edge(
        &self,
        edge: Relationship,
        auto_create: bool,
    ) -> StoreFuture<'_, MemoryResult<Relationship>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            for endpoint in [&edge.source, &edge.target] {
                if state.entities.contains_key(endpoint) {
                    continue;
                }
                if !auto_create {
                    return Err(MemoryError::NotFound(format!("entity {endpoint}")));
                }
                state.merge_node(Entity::new(endpoint.clone(), Default::default()));
            }

            if let Some(existing) = state
                .edges
                .iter_mut()
                .find(|e| e.matches(&edge.source, &edge.target, &edge.relation_type))
            {
                existing.properties.merge(&edge.properties);
                existing.updated_at = edge.updated_at;
                return Ok(existing.clone());
            }
            state.edges.push(edge.clone());
            Ok(edge)
        })
    }

    fn get_entity_view(&self, key: EntityKey) -> StoreFuture<'_, MemoryResult<Option<EntityView>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let Some(entity) = state.entities.get(&key).cloned() else {
                return Ok(None);
            };
            let outgoing = state.edges.iter().filter(|e| e.source == key).cloned().collect();
            let incoming = state.edges.iter().filter(|e| e.target == key).cloned().collect();
            Ok(Some(EntityView {
                entity,
                outgoing,
                incoming,
            }))
        })
    }

    fn query_text(&self, query: GraphTextQuery) -> StoreFuture<'_, MemoryResult<Vec<GraphHit>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let best = |candidates: Vec<GraphHit>| {
                let mut scored: Vec<(f64, GraphHit)> = candidates
                    .into_iter()
                    .map(|hit| (query.score(&hit), hit))
                    .filter(|(score, _)| *score > 0.0)
                    .collect();
                sort_by_score_then_recency(&mut scored, |(score, hit)| (*score, hit.recency()));
                scored
                    .into_iter()
                    .take(query.candidate_limit)
                    .map(|(_, hit)| hit)
            };

            let mut hits = Vec::new();
            if query.wants_entities() {
                hits.extend(best(
                    state
                        .entities
                        .values()
                        .filter(|e| query.accepts(e))
                        .cloned()
                        .map(GraphHit::Entity)
                        .collect(),
                ));
            }
            if query.wants_facts() {
                hits.extend(best(state.facts.iter().cloned().map(GraphHit::Fact).collect()));
            }
            Ok(hits)
        })
    }

    fn bfs(&self, query: TraversalQuery) -> StoreFuture<'_, MemoryResult<Vec<RelatedEntity>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            if !state.entities.contains_key(&query.origin) {
                return Err(MemoryError::NotFound(format!("entity {}", query.origin)));
            }

            let mut visited: HashSet<&EntityKey> = HashSet::new();
            let mut frontier: VecDeque<(&EntityKey, Vec<String>)> = VecDeque::new();
            let mut related = Vec::new();

            visited.insert(&query.origin);
            frontier.push_back((&query.origin, Vec::new()));

            while let Some((node, path)) = frontier.pop_front() {
                if path.len() >= query.max_hops {
                    continue;
                }
                for (next, relation_type) in state.neighbours(node, &query) {
                    if !visited.insert(next) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(relation_type.to_string());
                    if let Some(entity) = state.entities.get(next) {
                        related.push(RelatedEntity {
                            entity: entity.clone(),
                            hops: next_path.len(),
                            path: next_path.clone(),
                        });
                    }
                    frontier.push_back((next, next_path));
                }
            }

            debug!(
                origin = %query.origin,
                max_hops = query.max_hops,
                reached = related.len(),
                "graph traversal complete"
            );
            Ok(related)
        })
    }

    fn upsert_triple(&self, fact: Fact) -> StoreFuture<'_, MemoryResult<Fact>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if let Some(existing) = state
                .facts
                .iter_mut()
                .find(|f| f.matches(&fact.subject, &fact.predicate, &fact.object))
            {
                existing.confidence = fact.confidence;
                existing.context = fact.context;
                existing.created_at = fact.created_at;
                return Ok(existing.clone());
            }
            state.facts.push(fact.clone());
            Ok(fact)
        })
    }

    fn get_triples(&self, subject: String, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<Fact>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut facts: Vec<Fact> = state
                .facts
                .iter()
                .filter(|f| f.subject == subject)
                .cloned()
                .collect();
            facts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            facts.truncate(limit);
            Ok(facts)
        })
    }

    fn stats(&self) -> StoreFuture<'_, MemoryResult<GraphStats>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(GraphStats {
                entities: state.entities.len() as u64,
                relationships: state.edges.len() as u64,
                facts: state.facts.len() as u64,
            })
        })
    }
}
