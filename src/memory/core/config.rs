//! Configuration for the hybrid memory engine.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Prefix of every environment variable read by [`HybridConfig::from_env`].
pub const ENV_PREFIX: &str = "HYBRID_MEMORY_";

/// Top-level configuration for the hybrid memory engine.
///
/// Built once, validated, then shared by reference.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Vector database settings.
    pub vector: VectorConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Graph database settings.
    pub graph: GraphConfig,
    /// Reranker settings.
    pub reranker: RerankerConfig,
    /// Near-duplicate detection settings.
    pub dedupe: DedupeConfig,
    /// Call and recall budgets.
    pub timeouts: TimeoutConfig,
    /// Retrieval defaults and limits.
    pub retrieval: RetrievalConfig,
    /// HTTP tool surface settings.
    pub server: ServerConfig,
}

impl HybridConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.vector.collection.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "vector.collection must not be empty".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "embedding.model must not be empty".to_string(),
            ));
        }

        if !(self.dedupe.threshold > 0.0 && self.dedupe.threshold <= 1.0) {
            return Err(MemoryError::InvalidConfig(format!(
                "dedupe.threshold must lie in (0, 1], got {}",
                self.dedupe.threshold
            )));
        }

        if self.timeouts.call_ms == 0 || self.timeouts.recall_ms == 0 {
            return Err(MemoryError::InvalidConfig(
                "timeouts must be > 0".to_string(),
            ));
        }

        if self.reranker.candidate_multiplier == 0 {
            return Err(MemoryError::InvalidConfig(
                "reranker.candidate_multiplier must be >= 1".to_string(),
            ));
        }

        if self.retrieval.default_top_k == 0 || self.retrieval.max_hops_limit == 0 {
            return Err(MemoryError::InvalidConfig(
                "retrieval.default_top_k and retrieval.max_hops_limit must be > 0".to_string(),
            ));
        }

        Url::parse(&self.vector.url)?;
        Url::parse(&self.graph.url)?;
        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }
        if self.reranker.enabled {
            Url::parse(&self.reranker.base_url)?;
        }

        Ok(())
    }

    /// Build and validate a configuration from `HYBRID_MEMORY_*` variables.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unparsable values or failed validation.
    pub fn from_env() -> MemoryResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build and validate a configuration from an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names (prefix included). Unset or
    /// blank variables keep their defaults.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for unparsable values or failed validation.
    pub fn from_lookup<F>(lookup: F) -> MemoryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let mut config = Self::default();

        env.string("QDRANT_URL", &mut config.vector.url);
        env.optional("QDRANT_API_KEY", &mut config.vector.api_key);
        env.string("COLLECTION", &mut config.vector.collection);

        env.optional("OLLAMA_URL", &mut config.embedding.base_url);
        env.string("EMBEDDING_MODEL", &mut config.embedding.model);
        env.parsed("EMBEDDING_DIM", &mut config.embedding.ndims)?;

        env.string("NEO4J_URL", &mut config.graph.url);
        env.string("NEO4J_DATABASE", &mut config.graph.database);
        env.string("NEO4J_USER", &mut config.graph.user);
        env.string("NEO4J_PASSWORD", &mut config.graph.password);
        env.flag("AUTO_CREATE_ENDPOINTS", &mut config.graph.auto_create_endpoints)?;

        env.string("RERANKER_URL", &mut config.reranker.base_url);
        env.string("RERANKER_MODEL", &mut config.reranker.model);
        env.flag("RERANK", &mut config.reranker.enabled)?;

        env.parsed("CALL_TIMEOUT_MS", &mut config.timeouts.call_ms)?;
        env.parsed("RECALL_TIMEOUT_MS", &mut config.timeouts.recall_ms)?;

        env.parsed("DEDUPE_THRESHOLD", &mut config.dedupe.threshold)?;
        env.flag("DEDUPE", &mut config.dedupe.enabled)?;

        env.parsed("PORT", &mut config.server.port)?;

        config.validate()?;
        Ok(config)
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.call_ms)
    }

    /// Shared deadline for both recall branches.
    #[must_use]
    pub const fn recall_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.recall_ms)
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<(String, String)> {
        let full = format!("{ENV_PREFIX}{name}");
        (self.lookup)(&full)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| (full, value))
    }

    fn string(&self, name: &str, slot: &mut String) {
        if let Some((_, value)) = self.raw(name) {
            *slot = value;
        }
    }

    fn optional(&self, name: &str, slot: &mut Option<String>) {
        if let Some((_, value)) = self.raw(name) {
            *slot = Some(value);
        }
    }

    fn parsed<T>(&self, name: &str, slot: &mut T) -> MemoryResult<()>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some((full, value)) = self.raw(name) {
            *slot = value.parse().map_err(|err| {
                MemoryError::InvalidConfig(format!("{full}={value}: {err}"))
            })?;
        }
        Ok(())
    }

    fn flag(&self, name: &str, slot: &mut bool) -> MemoryResult<()> {
        if let Some((full, value)) = self.raw(name) {
            *slot = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(MemoryError::InvalidConfig(format!(
                        "{full}={value}: expected a boolean"
                    )));
                }
            };
        }
        Ok(())
    }
}

/// Vector database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Qdrant REST endpoint.
    pub url: String,
    /// Collection holding memory records.
    pub collection: String,
    /// Optional API key sent as `api-key`.
    pub api_key: Option<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "agent_memory".to_string(),
            api_key: None,
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
        }
    }
}

/// Graph database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint.
    pub url: String,
    /// Database name.
    pub database: String,
    /// Basic auth user.
    pub user: String,
    /// Basic auth password.
    pub password: String,
    /// Create missing relationship endpoints instead of failing.
    pub auto_create_endpoints: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            auto_create_endpoints: true,
        }
    }
}

/// Reranker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Whether recall reranks semantic candidates.
    pub enabled: bool,
    /// OpenAI-compatible completions endpoint.
    pub base_url: String,
    /// Served model name.
    pub model: String,
    /// Over-fetch factor for rerank candidates.
    pub candidate_multiplier: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8004".to_string(),
            model: "Qwen/Qwen3-Reranker-0.6B".to_string(),
            candidate_multiplier: 3,
        }
    }
}

/// Near-duplicate detection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Whether `add` checks for near-duplicates.
    pub enabled: bool,
    /// Cosine similarity at or above which texts are duplicates.
    pub threshold: f64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.95,
        }
    }
}

/// Time budgets in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for one external call.
    pub call_ms: u64,
    /// Shared deadline for a recall.
    pub recall_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_ms: 10_000,
            recall_ms: 30_000,
        }
    }
}

/// Retrieval defaults and limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// `top_k` used when a tool call omits it.
    pub default_top_k: usize,
    /// Upper clamp for traversal hops.
    pub max_hops_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_hops_limit: 5,
        }
    }
}

/// HTTP tool surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HybridConfig::default();
        config.validate().unwrap();
        assert!((config.dedupe.threshold - 0.95).abs() < f64::EPSILON);
        assert!(config.graph.auto_create_endpoints);
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = HybridConfig::from_lookup(lookup(&[
            ("COLLECTION", "team_memory"),
            ("EMBEDDING_DIM", "1024"),
            ("RERANK", "true"),
            ("AUTO_CREATE_ENDPOINTS", "0"),
            ("DEDUPE_THRESHOLD", "0.9"),
            ("PORT", "8088"),
            ("NEO4J_PASSWORD", "   "),
        ]))
        .unwrap();

        assert_eq!(config.vector.collection, "team_memory");
        assert_eq!(config.embedding.ndims, 1024);
        assert!(config.reranker.enabled);
        assert!(!config.graph.auto_create_endpoints);
        assert!((config.dedupe.threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.server.port, 8088);
        assert!(config.graph.password.is_empty());
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(matches!(
            HybridConfig::from_lookup(lookup(&[("EMBEDDING_DIM", "lots")])),
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(HybridConfig::from_lookup(lookup(&[("DEDUPE", "maybe")])).is_err());
        assert!(HybridConfig::from_lookup(lookup(&[("DEDUPE_THRESHOLD", "1.5")])).is_err());
        assert!(HybridConfig::from_lookup(lookup(&[("QDRANT_URL", "not a url")])).is_err());
    }
}
