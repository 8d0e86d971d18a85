//! Identifier types for the hybrid memory engine.
//!
//! Memory records carry a content-derived [`MemoryId`]: the UUID v5 of the
//! normalized text inside a fixed namespace. Two writers racing on the same
//! text therefore target the same backend point and the backend's own upsert
//! keeps a single record.
//!
//! Graph entities are keyed by [`EntityKey`], the `(name, type)` pair.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::ingest::dedupe::normalize_text;

/// Namespace for content-derived memory ids.
const MEMORY_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_4c2e_9b7d_4e0a_8f31_c5d2_7e90_b3a4);

/// Maximum accepted length for entity names and types.
pub const MAX_KEY_CHARS: usize = 256;

/// Identifier for a stored memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Derive the identifier of a text from its normalized form.
    #[must_use]
    pub fn from_content(text: &str) -> Self {
        Self(Uuid::new_v5(&MEMORY_NAMESPACE, normalize_text(text).as_bytes()))
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MemoryId {
    #[inline]
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of a graph entity: `(name, type)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Entity name, unique within its type.
    pub name: String,
    /// Type label (`Person`, `System`, `Concept`, ...).
    #[serde(rename = "type", alias = "entity_type")]
    pub entity_type: String,
}

impl EntityKey {
    /// Build a validated key. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `InvalidInput` if either part is empty or too long.
    pub fn new(name: impl AsRef<str>, entity_type: impl AsRef<str>) -> MemoryResult<Self> {
        let name = validate_part("entity name", name.as_ref())?;
        let entity_type = validate_part("entity type", entity_type.as_ref())?;
        Ok(Self { name, entity_type })
    }

    /// Re-validate a key that came in through deserialization.
    ///
    /// # Errors
    /// Returns `InvalidInput` if either part is empty or too long.
    pub fn validated(self) -> MemoryResult<Self> {
        Self::new(self.name, self.entity_type)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.name)
    }
}

fn validate_part(what: &str, value: &str) -> MemoryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::InvalidInput(format!("{what} must not be empty")));
    }
    let len = trimmed.chars().count();
    if len > MAX_KEY_CHARS {
        return Err(MemoryError::InvalidInput(format!(
            "{what} too long: got {len}, max {MAX_KEY_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable_across_whitespace_and_case() {
        let a = MemoryId::from_content("The deploy runs on Fridays");
        let b = MemoryId::from_content("  the   DEPLOY runs on fridays ");
        assert_eq!(a, b);
        assert_ne!(a, MemoryId::from_content("The deploy runs on Mondays"));
    }

    #[test]
    fn test_memory_id_roundtrips_through_string() {
        let id = MemoryId::from_content("hello");
        let parsed: MemoryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_entity_key_trims_and_rejects_empty() {
        let key = EntityKey::new(" Alice ", "Person").unwrap();
        assert_eq!(key.name, "Alice");
        assert_eq!(key.to_string(), "Person:Alice");
        assert!(matches!(
            EntityKey::new("  ", "Person"),
            Err(MemoryError::InvalidInput(_))
        ));
        assert!(EntityKey::new("x".repeat(MAX_KEY_CHARS + 1), "Person").is_err());
    }

    #[test]
    fn test_entity_key_accepts_entity_type_alias() {
        let key: EntityKey =
            serde_json::from_str(r#"{"name":"db","entity_type":"System"}"#).unwrap();
        assert_eq!(key.entity_type, "System");
    }
}
