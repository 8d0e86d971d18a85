//! Graph backend contract for entities, relationships and facts.

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::graph::{
    Entity, EntityView, Fact, GraphHit, GraphStats, RelatedEntity, Relationship, TraversalQuery,
};
use crate::memory::core::ids::EntityKey;
use crate::memory::retrieval::ranking::KeywordQuery;
use crate::memory::storage::vector_store::StoreFuture;

/// Which graph elements a keyword query covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphScope {
    /// Entities only.
    Entities,
    /// Facts only.
    Facts,
    /// Entities and facts.
    #[default]
    Both,
}

impl GraphScope {
    /// Whether entities are included.
    #[must_use]
    pub const fn entities(self) -> bool {
        matches!(self, Self::Entities | Self::Both)
    }

    /// Whether facts are included.
    #[must_use]
    pub const fn facts(self) -> bool {
        matches!(self, Self::Facts | Self::Both)
    }
}

/// Keyword query handed to [`GraphBackend::query_text`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphTextQuery {
    /// Parsed query terms and phrase.
    pub keywords: KeywordQuery,
    /// Element kinds to search.
    pub scope: GraphScope,
    /// Only entities of this type; facts are skipped when set.
    pub entity_type: Option<String>,
    /// Best candidates kept per element kind.
    pub candidate_limit: usize,
}

impl GraphTextQuery {
    /// Whether entities are searched.
    #[must_use]
    pub const fn wants_entities(&self) -> bool {
        self.scope.entities()
    }

    /// Whether facts are searched.
    #[must_use]
    pub const fn wants_facts(&self) -> bool {
        self.scope.facts() && self.entity_type.is_none()
    }

    /// Whether `entity` passes the type restriction.
    #[must_use]
    pub fn accepts(&self, entity: &Entity) -> bool {
        self.entity_type
            .as_deref()
            .is_none_or(|wanted| entity.entity_type == wanted)
    }

    /// Match-breadth score of a hit against the keywords.
    #[must_use]
    pub fn score(&self, hit: &GraphHit) -> f64 {
        match hit {
            GraphHit::Entity(e) => self
                .keywords
                .score(&[e.name.as_str(), e.entity_type.as_str()]),
            GraphHit::Fact(f) => {
                self.keywords
                    .score(&[f.subject.as_str(), f.predicate.as_str(), f.object.as_str()])
            }
        }
    }
}

/// Graph database abstraction.
///
/// Node, edge and triple upserts must be atomic with respect to concurrent
/// upserts of the same key.
pub trait GraphBackend: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Create indexes or constraints the backend relies on.
    ///
    /// # Errors
    /// Returns `Store` if the schema cannot be applied.
    fn ensure_schema(&self) -> StoreFuture<'_, MemoryResult<()>>;

    /// Upsert a node, merging properties into an existing one.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn upsert_node(&self, entity: Entity) -> StoreFuture<'_, MemoryResult<Entity>>;

    /// Upsert an edge keyed by `(source, target, type)`.
    ///
    /// Missing endpoints are created when `auto_create` is set.
    ///
    /// # Errors
    /// Returns `NotFound` naming a missing endpoint when `auto_create` is
    /// unset, `Store` on backend failure.
    fn upsert_edge(
        &self,
        edge: Relationship,
        auto_create: bool,
    ) -> StoreFuture<'_, MemoryResult<Relationship>>;

    /// Node with its outgoing and incoming edges.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn get_entity_view(&self, key: EntityKey) -> StoreFuture<'_, MemoryResult<Option<EntityView>>>;

    /// Entities and facts whose fields contain at least one query term
    /// (case-insensitive).
    ///
    /// Matches are ranked by match breadth before the per-kind
    /// `candidate_limit` applies, so the best matches survive the cap.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn query_text(&self, query: GraphTextQuery) -> StoreFuture<'_, MemoryResult<Vec<GraphHit>>>;

    /// Bounded breadth-first traversal from an origin, excluding it. Each
    /// reached entity carries the relationship types along its shortest path.
    ///
    /// # Errors
    /// Returns `NotFound` if the origin is absent, `Store` on backend failure.
    fn bfs(&self, query: TraversalQuery) -> StoreFuture<'_, MemoryResult<Vec<RelatedEntity>>>;

    /// Upsert a fact keyed by its exact triple.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn upsert_triple(&self, fact: Fact) -> StoreFuture<'_, MemoryResult<Fact>>;

    /// Facts about a subject, most recent first.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn get_triples(&self, subject: String, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<Fact>>>;

    /// Entity, relationship and fact counts.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    fn stats(&self) -> StoreFuture<'_, MemoryResult<GraphStats>>;
}
