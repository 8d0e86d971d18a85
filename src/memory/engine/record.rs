//! Compound record request and its per-step report.
//!
//! A record writes one memory and any number of entities, relationships and
//! facts. Steps run in order and every step is attempted; nothing is rolled
//! back, so the report is the only source of truth about what landed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{ErrorReport, MemoryError, MemoryResult};
use crate::memory::core::graph::{Entity, Fact, Relationship};
use crate::memory::core::ids::EntityKey;
use crate::memory::core::metadata::Metadata;
use crate::memory::core::record::MemoryRecord;

/// Entity type used when a record request omits it.
pub const DEFAULT_ENTITY_TYPE: &str = "Unknown";

fn default_entity_type() -> String {
    DEFAULT_ENTITY_TYPE.to_string()
}

/// Entity to upsert as part of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Entity name.
    pub name: String,
    /// Entity type.
    #[serde(rename = "type", alias = "entity_type", default = "default_entity_type")]
    pub entity_type: String,
    /// Properties to merge.
    #[serde(default)]
    pub properties: Metadata,
}

/// Relationship to upsert as part of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    /// Source entity.
    pub source: EntityKey,
    /// Target entity.
    pub target: EntityKey,
    /// Relationship type.
    #[serde(rename = "type", alias = "relationship")]
    pub relation_type: String,
    /// Properties to merge.
    #[serde(default)]
    pub properties: Metadata,
}

/// Fact to upsert as part of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactSpec {
    /// Subject.
    pub subject: String,
    /// Predicate.
    pub predicate: String,
    /// Object.
    pub object: String,
    /// Optional confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Optional context.
    #[serde(default)]
    pub context: Option<String>,
}

/// Input of [`HybridCoordinator::record`](crate::memory::engine::HybridCoordinator::record).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordRequest {
    /// Memory text.
    #[serde(alias = "content")]
    pub text: String,
    /// Memory metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Entities to upsert.
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    /// Relationships to upsert.
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
    /// Facts to upsert.
    #[serde(default)]
    pub facts: Vec<FactSpec>,
}

impl RecordRequest {
    /// Request storing only a memory.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Add an entity.
    #[must_use]
    pub fn entity(mut self, name: &str, entity_type: &str) -> Self {
        self.entities.push(EntitySpec {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            properties: Metadata::new(),
        });
        self
    }

    /// Add a relationship.
    #[must_use]
    pub fn relationship(mut self, source: EntityKey, target: EntityKey, relation_type: &str) -> Self {
        self.relationships.push(RelationshipSpec {
            source,
            target,
            relation_type: relation_type.to_string(),
            properties: Metadata::new(),
        });
        self
    }

    /// Add a fact.
    #[must_use]
    pub fn fact(mut self, subject: &str, predicate: &str, object: &str) -> Self {
        self.facts.push(FactSpec {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
            confidence: None,
            context: None,
        });
        self
    }
}

/// Result of one sub-write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    /// The write landed.
    Ok {
        /// Stored value.
        value: T,
    },
    /// The write failed.
    Failed {
        /// Captured failure.
        error: ErrorReport,
    },
}

impl<T> StepOutcome<T> {
    /// Whether the step succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Stored value, if the step succeeded.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Captured error, if the step failed.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorReport> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

impl<T> From<MemoryResult<T>> for StepOutcome<T> {
    fn from(result: MemoryResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(err) => Self::Failed {
                error: err.report(),
            },
        }
    }
}

/// Overall outcome of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Every step succeeded.
    Complete,
    /// Some steps failed.
    Partial,
    /// Every step failed.
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        })
    }
}

/// Per-step report of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordReport {
    /// Overall status.
    pub status: RecordStatus,
    /// Memory write.
    pub memory: StepOutcome<MemoryRecord>,
    /// Entity upserts, in request order.
    pub entities: Vec<StepOutcome<Entity>>,
    /// Relationship upserts, in request order.
    pub relationships: Vec<StepOutcome<Relationship>>,
    /// Fact upserts, in request order.
    pub facts: Vec<StepOutcome<Fact>>,
}

impl RecordReport {
    /// Assemble a report and derive its status.
    #[must_use]
    pub fn new(
        memory: StepOutcome<MemoryRecord>,
        entities: Vec<StepOutcome<Entity>>,
        relationships: Vec<StepOutcome<Relationship>>,
        facts: Vec<StepOutcome<Fact>>,
    ) -> Self {
        let mut report = Self {
            status: RecordStatus::Complete,
            memory,
            entities,
            relationships,
            facts,
        };
        let (ok, total) = report.counts();
        report.status = if ok == total {
            RecordStatus::Complete
        } else if ok == 0 {
            RecordStatus::Failed
        } else {
            RecordStatus::Partial
        };
        report
    }

    fn counts(&self) -> (usize, usize) {
        let ok = usize::from(self.memory.is_ok())
            + self.entities.iter().filter(|s| s.is_ok()).count()
            + self.relationships.iter().filter(|s| s.is_ok()).count()
            + self.facts.iter().filter(|s| s.is_ok()).count();
        let total = 1 + self.entities.len() + self.relationships.len() + self.facts.len();
        (ok, total)
    }

    /// Every captured failure, in step order.
    #[must_use]
    pub fn failures(&self) -> Vec<&ErrorReport> {
        self.memory
            .error()
            .into_iter()
            .chain(self.entities.iter().filter_map(StepOutcome::error))
            .chain(self.relationships.iter().filter_map(StepOutcome::error))
            .chain(self.facts.iter().filter_map(StepOutcome::error))
            .collect()
    }

    /// One-line description of the outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        fn ratio<T>(steps: &[StepOutcome<T>]) -> String {
            format!("{}/{}", steps.iter().filter(|s| s.is_ok()).count(), steps.len())
        }
        let mut line = format!(
            "{}: memory {}, entities {}, relationships {}, facts {}",
            self.status,
            if self.memory.is_ok() { "ok" } else { "failed" },
            ratio(&self.entities),
            ratio(&self.relationships),
            ratio(&self.facts),
        );
        if let Some(first) = self.failures().first() {
            line.push_str(&format!("; first error {first}"));
        }
        line
    }

    /// Convert a non-complete report into an error, for strict callers.
    ///
    /// # Errors
    /// Returns `PartialRecord` or `RecordFailed` carrying the report.
    pub fn ensure_complete(self) -> MemoryResult<Self> {
        match self.status {
            RecordStatus::Complete => Ok(self),
            RecordStatus::Partial => Err(MemoryError::PartialRecord(Box::new(self))),
            RecordStatus::Failed => Err(MemoryError::RecordFailed(Box::new(self))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::errors::ErrorKind;

    fn failed<T>() -> StepOutcome<T> {
        StepOutcome::from(Err(MemoryError::store("neo4j", "down")))
    }

    fn memory_ok() -> StepOutcome<MemoryRecord> {
        StepOutcome::Ok {
            value: MemoryRecord::new("x", vec![1.0], Metadata::new()),
        }
    }

    #[test]
    fn test_status_derivation() {
        let complete = RecordReport::new(memory_ok(), vec![], vec![], vec![]);
        assert_eq!(complete.status, RecordStatus::Complete);

        let partial = RecordReport::new(memory_ok(), vec![failed()], vec![], vec![]);
        assert_eq!(partial.status, RecordStatus::Partial);

        let all_failed = RecordReport::new(failed(), vec![failed()], vec![], vec![failed()]);
        assert_eq!(all_failed.status, RecordStatus::Failed);
        assert_eq!(all_failed.failures().len(), 3);
    }

    #[test]
    fn test_ensure_complete_raises_partial() {
        let partial = RecordReport::new(memory_ok(), vec![], vec![], vec![failed()]);
        let err = partial.ensure_complete().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialRecord);
        assert!(err.to_string().contains("facts 0/1"));
    }

    #[test]
    fn test_step_outcome_serializes_status_tag() {
        let step: StepOutcome<u8> = failed();
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "store");
    }

    #[test]
    fn test_request_accepts_content_alias_and_default_type() {
        let request: RecordRequest = serde_json::from_str(
            r#"{"content": "Alice joined", "entities": [{"name": "Alice"}]}"#,
        )
        .unwrap();
        assert_eq!(request.text, "Alice joined");
        assert_eq!(request.entities[0].entity_type, DEFAULT_ENTITY_TYPE);
    }
}
