//! Search options and metadata filters for semantic retrieval.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::metadata::{Metadata, MetadataValue, validate_key, validate_value};

/// Equality conditions on record metadata, all of which must hold.
///
/// Numbers compare by value, so an integer condition matches the same
/// quantity stored as a float and the reverse.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataFilter(BTreeMap<String, MetadataValue>);

impl<'de> Deserialize<'de> for MetadataFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl MetadataFilter {
    /// Filter that matches everything.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add an equality condition.
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate conditions in key order.
    pub fn conditions(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Whether `metadata` satisfies every condition.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| same_value(actual, expected))
        })
    }

    /// Whether `metadata` satisfies at least one condition.
    #[must_use]
    pub fn matches_any(&self, metadata: &Metadata) -> bool {
        self.0.iter().any(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| same_value(actual, expected))
        })
    }

    /// Whether the filter constrains `key`.
    #[must_use]
    pub fn mentions(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Parse an agent-supplied filter object (same leniency as metadata).
    ///
    /// # Errors
    /// Returns `InvalidInput` for non-scalar values or invalid keys.
    pub fn from_json(value: &Value) -> MemoryResult<Self> {
        let metadata = Metadata::from_json(value)?;
        Ok(metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Validate keys and values.
    ///
    /// # Errors
    /// Returns `InvalidInput` on the first offending condition.
    pub fn validate(&self) -> MemoryResult<()> {
        for (key, value) in &self.0 {
            validate_key(key)?;
            validate_value(key, value)?;
        }
        Ok(())
    }
}

#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn same_value(actual: &MetadataValue, expected: &MetadataValue) -> bool {
    match (actual, expected) {
        (MetadataValue::Integer(int), MetadataValue::Float(float))
        | (MetadataValue::Float(float), MetadataValue::Integer(int)) => *int as f64 == *float,
        _ => actual == expected,
    }
}

impl FromIterator<(String, MetadataValue)> for MetadataFilter {
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Options for a semantic search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub top_k: usize,
    /// Metadata equality filter.
    #[serde(default)]
    pub filter: MetadataFilter,
    /// Drop results scoring below this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Keep records that were replaced by a newer one.
    #[serde(default)]
    pub include_superseded: bool,
}

impl SearchOptions {
    /// Unfiltered search returning up to `top_k` results.
    #[must_use]
    pub const fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            filter: MetadataFilter::new(),
            min_score: None,
            include_superseded: false,
        }
    }

    /// Set the metadata filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the minimum score.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Also return superseded records.
    #[must_use]
    pub const fn with_superseded(mut self) -> Self {
        self.include_superseded = true;
        self
    }

    /// Validate the filter and score bound.
    ///
    /// # Errors
    /// Returns `InvalidInput` for invalid filters or a non-finite minimum score.
    pub fn validate(&self) -> MemoryResult<()> {
        if let Some(min_score) = self.min_score
            && !min_score.is_finite()
        {
            return Err(MemoryError::InvalidInput(
                "min_score must be finite".to_string(),
            ));
        }
        self.filter.validate()
    }
}
