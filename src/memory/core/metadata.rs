//! Scalar metadata attached to memory records and graph elements.
//!
//! Arbitrary key/value maps coming from an agent are narrowed at the boundary
//! into an ordered map of [`MetadataValue`] scalars. Nested values are
//! rejected; JSON `null` means "no value" and is dropped, which gives
//! property merges their "overwrite only with non-null values" behavior.
//!
//! Deserializing a [`Metadata`] goes through [`Metadata::from_json`], so every
//! serde entry point gets the same stringified-object leniency and limits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Prefix reserved for keys the backends write themselves.
pub const RESERVED_PREFIX: &str = "_hm_";

/// Maximum number of entries in one metadata map.
pub const MAX_ENTRIES: usize = 64;

/// Maximum length of a text value in characters.
pub const MAX_TEXT_CHARS: usize = 4096;

/// A scalar metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer number.
    Integer(i64),
    /// Floating point number (always finite).
    Float(f64),
    /// Text value.
    Text(String),
}

impl MetadataValue {
    /// Borrow the value as text, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Convert a JSON value into a scalar.
    ///
    /// Returns `Ok(None)` for `null`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for arrays, objects, non-finite or oversized values.
    pub fn from_json(key: &str, value: &Value) -> MemoryResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(flag) => Ok(Some(Self::Bool(*flag))),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    return Ok(Some(Self::Integer(int)));
                }
                match number.as_f64() {
                    Some(float) if float.is_finite() => Ok(Some(Self::Float(float))),
                    _ => Err(MemoryError::InvalidInput(format!(
                        "metadata `{key}` is not a finite number"
                    ))),
                }
            }
            Value::String(text) => {
                if text.chars().count() > MAX_TEXT_CHARS {
                    return Err(MemoryError::InvalidInput(format!(
                        "metadata `{key}` exceeds {MAX_TEXT_CHARS} chars"
                    )));
                }
                Ok(Some(Self::Text(text.clone())))
            }
            Value::Array(_) | Value::Object(_) => Err(MemoryError::InvalidInput(format!(
                "metadata `{key}` must be a string, number or bool"
            ))),
        }
    }

    /// Convert into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Integer(int) => Value::from(*int),
            Self::Float(float) => Value::from(*float),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Integer(int) => write!(f, "{int}"),
            Self::Float(float) => write!(f, "{float}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Ordered scalar map used for record metadata and graph properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl Metadata {
    /// Empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert for literals in code and tests.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Option<MetadataValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Merge `other` into `self`: new keys are added, existing keys are
    /// overwritten.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Parse an agent-supplied JSON object.
    ///
    /// Accepts an object, `null` (empty map), or a string holding a JSON
    /// object, since some agent clients stringify nested arguments.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the value is not an object of scalars or a key
    /// is invalid.
    pub fn from_json(value: &Value) -> MemoryResult<Self> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            Value::String(raw) => {
                let parsed: Value = serde_json::from_str(raw).map_err(|err| {
                    MemoryError::InvalidInput(format!("metadata string is not JSON: {err}"))
                })?;
                if matches!(parsed, Value::String(_)) {
                    return Err(MemoryError::InvalidInput(
                        "metadata must be a JSON object".to_string(),
                    ));
                }
                return Self::from_json(&parsed);
            }
            _ => {
                return Err(MemoryError::InvalidInput(
                    "metadata must be a JSON object".to_string(),
                ));
            }
        };

        let mut map = Self::new();
        for (key, raw) in object {
            if let Some(value) = MetadataValue::from_json(key, raw)? {
                map.0.insert(key.clone(), value);
            }
        }
        map.validate()?;
        Ok(map)
    }

    /// Convert to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Map<String, Value> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }

    /// Validate keys and values.
    ///
    /// # Errors
    /// Returns `InvalidInput` on the first offending entry.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.0.len() > MAX_ENTRIES {
            return Err(MemoryError::InvalidInput(format!(
                "metadata holds {} entries, max {MAX_ENTRIES}",
                self.0.len()
            )));
        }
        for (key, value) in &self.0 {
            validate_key(key)?;
            validate_value(key, value)?;
        }
        Ok(())
    }
}

/// Check a single scalar against the value limits.
///
/// # Errors
/// Returns `InvalidInput` for non-finite floats or oversized text.
pub fn validate_value(key: &str, value: &MetadataValue) -> MemoryResult<()> {
    match value {
        MetadataValue::Float(float) if !float.is_finite() => Err(MemoryError::InvalidInput(
            format!("metadata `{key}` is not a finite number"),
        )),
        MetadataValue::Text(text) if text.chars().count() > MAX_TEXT_CHARS => Err(
            MemoryError::InvalidInput(format!("metadata `{key}` exceeds {MAX_TEXT_CHARS} chars")),
        ),
        _ => Ok(()),
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]{0,63}$").ok())
        .as_ref()
}

/// Validate a metadata key.
///
/// # Errors
/// Returns `InvalidInput` if the key has an unsupported shape or uses the
/// reserved prefix.
pub fn validate_key(key: &str) -> MemoryResult<()> {
    let pattern = key_pattern()
        .ok_or_else(|| MemoryError::InvalidConfig("invalid metadata key pattern".to_string()))?;
    if !pattern.is_match(key) {
        return Err(MemoryError::InvalidInput(format!(
            "metadata key `{key}` must match [A-Za-z_][A-Za-z0-9_.-]{{0,63}}"
        )));
    }
    if key.starts_with(RESERVED_PREFIX) {
        return Err(MemoryError::InvalidInput(format!(
            "metadata key `{key}` uses the reserved prefix {RESERVED_PREFIX}"
        )));
    }
    Ok(())
}
