//! Knowledge graph model: entities, relationships and facts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::EntityKey;
use crate::memory::core::metadata::Metadata;

/// Maximum length of a relationship type label.
pub const MAX_RELATION_TYPE_CHARS: usize = 64;

/// Maximum length of a fact component (subject, predicate, object).
pub const MAX_FACT_PART_CHARS: usize = 1024;

/// A graph node identified by `(name, type)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// Type label.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Merged scalar properties.
    #[serde(default)]
    pub properties: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last merge timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Fresh entity for `key`.
    #[must_use]
    pub fn new(key: EntityKey, properties: Metadata) -> Self {
        let now = Utc::now();
        Self {
            name: key.name,
            entity_type: key.entity_type,
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity key of the entity.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey {
            name: self.name.clone(),
            entity_type: self.entity_type.clone(),
        }
    }

    /// Merge properties into this entity and bump `updated_at`.
    pub fn merge(&mut self, properties: &Metadata) {
        self.properties.merge(properties);
        self.updated_at = Utc::now();
    }
}

/// Directed, typed edge between two entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity.
    pub source: EntityKey,
    /// Target entity.
    pub target: EntityKey,
    /// Relationship type label (upper case).
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Merged scalar properties.
    #[serde(default)]
    pub properties: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last merge timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Fresh relationship.
    #[must_use]
    pub fn new(
        source: EntityKey,
        target: EntityKey,
        relation_type: String,
        properties: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            source,
            target,
            relation_type,
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this edge has the given identity triple.
    #[must_use]
    pub fn matches(&self, source: &EntityKey, target: &EntityKey, relation_type: &str) -> bool {
        self.source == *source && self.target == *target && self.relation_type == relation_type
    }
}

/// Subject-predicate-object assertion, independent of the entity node set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Subject.
    pub subject: String,
    /// Predicate.
    pub predicate: String,
    /// Object.
    pub object: String,
    /// Optional confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Optional provenance or context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Creation (or last refresh) timestamp.
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Whether this fact has the given triple.
    #[must_use]
    pub fn matches(&self, subject: &str, predicate: &str, object: &str) -> bool {
        self.subject == subject && self.predicate == predicate && self.object == object
    }
}

/// Validated input for a fact upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct FactInput {
    /// Subject.
    pub subject: String,
    /// Predicate.
    pub predicate: String,
    /// Object.
    pub object: String,
    /// Optional confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Optional context.
    pub context: Option<String>,
}

impl FactInput {
    /// Validate and trim a fact triple.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty parts or confidence outside `[0, 1]`.
    pub fn new(
        subject: &str,
        predicate: &str,
        object: &str,
        confidence: Option<f64>,
        context: Option<String>,
    ) -> MemoryResult<Self> {
        if let Some(value) = confidence
            && !(0.0..=1.0).contains(&value)
        {
            return Err(MemoryError::InvalidInput(format!(
                "confidence must lie in [0, 1], got {value}"
            )));
        }
        Ok(Self {
            subject: fact_part("subject", subject)?,
            predicate: fact_part("predicate", predicate)?,
            object: fact_part("object", object)?,
            confidence,
            context: context
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        })
    }

    /// Materialize the fact with the current timestamp.
    #[must_use]
    pub fn into_fact(self) -> Fact {
        Fact {
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
            confidence: self.confidence,
            context: self.context,
            created_at: Utc::now(),
        }
    }
}

fn fact_part(what: &str, value: &str) -> MemoryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::InvalidInput(format!("fact {what} must not be empty")));
    }
    if trimmed.chars().count() > MAX_FACT_PART_CHARS {
        return Err(MemoryError::InvalidInput(format!(
            "fact {what} exceeds {MAX_FACT_PART_CHARS} chars"
        )));
    }
    Ok(trimmed.to_string())
}

/// Normalize a relationship type label.
///
/// Labels must be identifier-like; they are stored upper case.
///
/// # Errors
/// Returns `InvalidInput` for empty, overlong or non-identifier labels.
pub fn normalize_relation_type(raw: &str) -> MemoryResult<String> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || trimmed.len() > MAX_RELATION_TYPE_CHARS {
        return Err(MemoryError::InvalidInput(format!(
            "relationship type `{raw}` must match [A-Za-z_][A-Za-z0-9_]* (max {MAX_RELATION_TYPE_CHARS})"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// An entity with its outgoing and incoming relationships.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    /// The entity.
    pub entity: Entity,
    /// Edges where the entity is the source.
    pub outgoing: Vec<Relationship>,
    /// Edges where the entity is the target.
    pub incoming: Vec<Relationship>,
}

/// Entity reached by traversal with its BFS distance from the origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    /// The reached entity.
    pub entity: Entity,
    /// Number of hops from the origin (>= 1).
    pub hops: usize,
    /// Relationship types along the path from the origin, one per hop.
    #[serde(default)]
    pub path: Vec<String>,
}

/// Which edges a traversal follows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source to target only.
    Outgoing,
    /// Target to source only.
    Incoming,
    /// Either way.
    #[default]
    Both,
}

impl Direction {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded traversal request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalQuery {
    /// Origin entity.
    pub origin: EntityKey,
    /// Maximum hops (>= 1).
    pub max_hops: usize,
    /// Allowed relationship types (normalized); empty means all.
    pub relation_types: Vec<String>,
    /// Edge direction to follow.
    pub direction: Direction,
}

/// Candidate returned by a backend keyword query, before scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GraphHit {
    /// Matching entity.
    Entity(Entity),
    /// Matching fact.
    Fact(Fact),
}

impl GraphHit {
    /// Timestamp used to break score ties.
    #[must_use]
    pub const fn recency(&self) -> DateTime<Utc> {
        match self {
            Self::Entity(entity) => entity.updated_at,
            Self::Fact(fact) => fact.created_at,
        }
    }
}

/// Graph size counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of entities.
    pub entities: u64,
    /// Number of relationships.
    pub relationships: u64,
    /// Number of facts.
    pub facts: u64,
}
