//! Deduplicated semantic memory over a vector backend.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::memory::core::config::{DedupeConfig, HybridConfig};
use crate::memory::core::errors::{ErrorKind, MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::metadata::{Metadata, MetadataValue};
use crate::memory::core::record::{MemoryRecord, check_embedding, clean_text};
use crate::memory::embedding::embedder::Embedder;
use crate::memory::engine::budget::bounded;
use crate::memory::ingest::semantic_dedupe::{DedupeDecision, classify};
use crate::memory::retrieval::ranking::sort_by_score_then_recency;
use crate::memory::retrieval::search::{MetadataFilter, SearchOptions};
use crate::memory::storage::vector_store::{VectorBackend, VectorHit, VectorQuery};

/// Metadata key marking a record replaced by a newer one.
pub const STATUS_KEY: &str = "status";
/// Value of [`STATUS_KEY`] on superseded records.
pub const SUPERSEDED: &str = "superseded";
/// Metadata key on a superseded record naming its replacement.
pub const SUPERSEDED_BY_KEY: &str = "superseded_by";
/// Metadata key on a replacement naming the record it supersedes.
pub const SUPERSEDES_KEY: &str = "supersedes";

/// Size and shape of the semantic store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStats {
    /// Number of stored records.
    pub record_count: u64,
    /// Embedding dimension.
    pub embedding_dim: usize,
    /// Backend collection.
    pub collection_name: String,
}

/// Outcome of [`VectorStore::supersede`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Superseded {
    /// The new record.
    pub record: MemoryRecord,
    /// The old record with its updated metadata.
    pub previous: MemoryRecord,
}

/// Semantic memory with near-duplicate suppression.
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    dedupe: DedupeConfig,
    call_timeout: Duration,
}

impl VectorStore {
    /// Create a store.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the embedder dimension disagrees with the
    /// configuration.
    pub fn new(
        config: &HybridConfig,
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        if embedder.ndims() != config.embedding.ndims {
            return Err(MemoryError::InvalidConfig(format!(
                "embedder produces {} dims, configuration expects {}",
                embedder.ndims(),
                config.embedding.ndims
            )));
        }
        Ok(Self {
            backend,
            embedder,
            dedupe: config.dedupe.clone(),
            call_timeout: config.call_timeout(),
        })
    }

    /// Make sure the backend collection exists with the right dimension.
    ///
    /// # Errors
    /// Returns `Store`, `Timeout` or `InvalidConfig` on failure.
    pub async fn init(&self) -> MemoryResult<()> {
        bounded(
            "vector_init",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.ensure_collection(self.embedder.ndims()),
        )
        .await
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f64>> {
        let embedding = bounded(
            "embed",
            ErrorKind::Embedding,
            self.call_timeout,
            self.embedder.embed_text(text),
        )
        .await?;
        check_embedding(&embedding.vec, self.embedder.ndims())?;
        Ok(embedding.vec)
    }

    async fn nearest(&self, vector: Vec<f64>) -> MemoryResult<Option<VectorHit>> {
        let query = VectorQuery {
            vector,
            limit: 1,
            filter: MetadataFilter::new(),
            exclude: superseded_only(),
            min_score: None,
        };
        let hits = bounded(
            "vector_search",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.search(query),
        )
        .await?;
        Ok(hits.into_iter().next())
    }

    async fn upsert(&self, record: MemoryRecord) -> MemoryResult<()> {
        bounded(
            "vector_upsert",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.upsert(record),
        )
        .await
    }

    async fn fetch(&self, id: MemoryId) -> MemoryResult<Option<MemoryRecord>> {
        bounded(
            "vector_get",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.get(id),
        )
        .await
    }

    /// Store a memory unless it is already known.
    ///
    /// A record with the same normalized text is returned unchanged before
    /// anything is embedded. Otherwise a near-duplicate found by similarity
    /// is returned unchanged. Superseded records never count as duplicates:
    /// re-adding a superseded text stores it again as an active record under
    /// the same id.
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty text or bad metadata, `Embedding` or
    /// `Store` (possibly as `Timeout`) when a call fails.
    pub async fn add(&self, text: &str, metadata: Metadata) -> MemoryResult<MemoryRecord> {
        let text = clean_text(text)?;
        metadata.validate()?;

        let reinstated = match self.fetch(MemoryId::from_content(text)).await? {
            Some(existing) if !is_superseded(&existing) => {
                debug!(memory_id = %existing.id, "identical memory already stored");
                return Ok(existing);
            }
            Some(_) => true,
            None => false,
        };

        let vector = self.embed(text).await?;
        if self.dedupe.enabled {
            let nearest = self.nearest(vector.clone()).await?;
            if let DedupeDecision::Duplicate {
                existing,
                similarity,
            } = classify(nearest, &self.dedupe)
            {
                debug!(
                    memory_id = %existing.id,
                    similarity,
                    "near-duplicate memory, keeping existing record"
                );
                return Ok(*existing);
            }
        }

        let record = MemoryRecord::new(text, vector, metadata);
        self.upsert(record.clone()).await?;
        info!(
            memory_id = %record.id,
            chars = record.text.len(),
            reinstated,
            "stored memory"
        );
        Ok(record)
    }

    /// Nearest records to `query`, best first, ties broken by recency.
    ///
    /// Superseded records are left out unless the options ask for them or
    /// the filter itself constrains [`STATUS_KEY`].
    ///
    /// # Errors
    /// Returns `InvalidInput` for an empty query or invalid options,
    /// `Embedding` or `Store` when a call fails.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> MemoryResult<Vec<VectorHit>> {
        if options.top_k == 0 {
            return Ok(Vec::new());
        }
        let query = clean_text(query)?;
        options.validate()?;
        let vector = self.embed(query).await?;

        let exclude = if options.include_superseded || options.filter.mentions(STATUS_KEY) {
            MetadataFilter::new()
        } else {
            superseded_only()
        };
        let request = VectorQuery {
            vector,
            limit: options.top_k,
            filter: options.filter.clone(),
            exclude,
            min_score: options.min_score,
        };
        let mut hits = bounded(
            "vector_search",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.search(request),
        )
        .await?;
        sort_by_score_then_recency(&mut hits, |hit| (hit.score, hit.record.created_at));
        hits.truncate(options.top_k);
        debug!(results = hits.len(), top_k = options.top_k, "semantic search complete");
        Ok(hits)
    }

    /// Most recent records, newest first.
    ///
    /// # Errors
    /// Returns `Store` when the backend call fails.
    pub async fn recent(&self, limit: usize, filter: MetadataFilter) -> MemoryResult<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        filter.validate()?;
        bounded(
            "vector_recent",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.recent(limit, filter),
        )
        .await
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    /// Returns `NotFound` if absent, `Store` when the backend call fails.
    pub async fn get(&self, id: MemoryId) -> MemoryResult<MemoryRecord> {
        self.fetch(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("memory {id}")))
    }

    /// Record count, dimension and collection.
    ///
    /// # Errors
    /// Returns `Store` when the backend call fails.
    pub async fn stats(&self) -> MemoryResult<VectorStats> {
        let record_count = bounded(
            "vector_count",
            ErrorKind::Store,
            self.call_timeout,
            self.backend.count(),
        )
        .await?;
        Ok(VectorStats {
            record_count,
            embedding_dim: self.embedder.ndims(),
            collection_name: self.backend.collection().to_string(),
        })
    }

    /// Replace a record with a new text.
    ///
    /// The new record skips dedupe and carries `supersedes = old_id`; the old
    /// record keeps its text and embedding but gains
    /// `status = "superseded"` and `superseded_by = new_id`.
    ///
    /// # Errors
    /// Returns `NotFound` if `old_id` is absent, `InvalidInput` if the new
    /// text maps to the same id, `Embedding` or `Store` when a call fails.
    pub async fn supersede(
        &self,
        old_id: MemoryId,
        text: &str,
        metadata: Metadata,
    ) -> MemoryResult<Superseded> {
        let text = clean_text(text)?;
        metadata.validate()?;
        let mut previous = self.get(old_id).await?;
        if MemoryId::from_content(text) == old_id {
            return Err(MemoryError::InvalidInput(
                "replacement text is identical to the superseded memory".to_string(),
            ));
        }

        let vector = self.embed(text).await?;
        let metadata = metadata.with(SUPERSEDES_KEY, old_id.to_string());
        let record = MemoryRecord::new(text, vector, metadata);
        self.upsert(record.clone()).await?;

        previous.metadata.insert(STATUS_KEY, SUPERSEDED);
        previous
            .metadata
            .insert(SUPERSEDED_BY_KEY, record.id.to_string());
        self.upsert(previous.clone()).await?;

        info!(old_id = %old_id, new_id = %record.id, "superseded memory");
        Ok(Superseded { record, previous })
    }
}

fn superseded_only() -> MetadataFilter {
    MetadataFilter::new().eq(STATUS_KEY, SUPERSEDED)
}

fn is_superseded(record: &MemoryRecord) -> bool {
    record.metadata.get(STATUS_KEY).and_then(MetadataValue::as_text) == Some(SUPERSEDED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::in_memory::InMemoryVectorBackend;
    use crate::memory::testing::{FailingVectorBackend, KeyedEmbedder, test_config, unit};

    fn store_with(embedder: KeyedEmbedder) -> (VectorStore, Arc<InMemoryVectorBackend>) {
        let backend = Arc::new(InMemoryVectorBackend::new("test"));
        let store = VectorStore::new(&test_config(), backend.clone(), Arc::new(embedder)).unwrap();
        (store, backend)
    }

    #[tokio::test]
    async fn test_add_same_text_twice_is_idempotent() {
        let (store, backend) = store_with(KeyedEmbedder::new());
        let first = store.add("Deploys run on Fridays", Metadata::new()).await.unwrap();
        let second = store.add("Deploys run on Fridays", Metadata::new()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_same_text_with_dedupe_disabled_keeps_one_record() {
        let backend = Arc::new(InMemoryVectorBackend::new("test"));
        let mut config = test_config();
        config.dedupe.enabled = false;
        let store =
            VectorStore::new(&config, backend.clone(), Arc::new(KeyedEmbedder::new())).unwrap();
        let first = store.add("same text", Metadata::new()).await.unwrap();
        let second = store.add("  Same   TEXT ", Metadata::new()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_case_variant_returns_stored_record_unchanged() {
        let embedder = KeyedEmbedder::case_sensitive()
            .with("Alice likes tea", unit(1.0))
            .with("alice likes tea", unit(0.5));
        let (store, backend) = store_with(embedder);

        let first = store
            .add("Alice likes tea", Metadata::new().with("source", "first"))
            .await
            .unwrap();
        let second = store
            .add("alice likes tea", Metadata::new().with("source", "second"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.text, "Alice likes tea");
        assert_eq!(backend.count().await.unwrap(), 1);
        let stored = store.get(first.id).await.unwrap();
        assert_eq!(stored.text, "Alice likes tea");
        assert_eq!(stored.metadata.get("source").and_then(MetadataValue::as_text), Some("first"));
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_near_duplicate_boundary() {
        let threshold = test_config().dedupe.threshold;
        let eps = 1e-6;
        let embedder = KeyedEmbedder::new()
            .with("base", unit(1.0))
            .with("just above", unit(threshold + eps))
            .with("just below", unit(threshold - eps));
        let (store, backend) = store_with(embedder);

        let base = store.add("base", Metadata::new()).await.unwrap();
        let above = store.add("just above", Metadata::new()).await.unwrap();
        assert_eq!(above.id, base.id);
        assert_eq!(backend.count().await.unwrap(), 1);

        let below = store.add("just below", Metadata::new()).await.unwrap();
        assert_ne!(below.id, base.id);
        assert_eq!(backend.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_orders_and_truncates() {
        let embedder = KeyedEmbedder::new()
            .with("query", unit(1.0))
            .with("high", unit(0.9))
            .with("mid", unit(0.7))
            .with("low", unit(0.5));
        let (store, _) = store_with(embedder);
        for text in ["low", "high", "mid"] {
            store.add(text, Metadata::new()).await.unwrap();
        }

        let hits = store.search("query", &SearchOptions::top_k(2)).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.record.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
        assert!((hits[0].score - 0.9).abs() < 1e-9);
        assert!((hits[1].score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_search_ties_prefer_recent() {
        let embedder = KeyedEmbedder::new()
            .with("query", unit(1.0))
            .with("older", unit(0.8))
            .with("newer", unit(0.8));
        let mut config = test_config();
        config.dedupe.enabled = false;
        let backend = Arc::new(InMemoryVectorBackend::new("test"));
        let store = VectorStore::new(&config, backend, Arc::new(embedder)).unwrap();

        store.add("older", Metadata::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.add("newer", Metadata::new()).await.unwrap();

        let hits = store.search("query", &SearchOptions::top_k(2)).await.unwrap();
        assert_eq!(hits[0].record.text, "newer");
    }

    #[tokio::test]
    async fn test_search_top_k_zero_skips_backend() {
        let backend = Arc::new(FailingVectorBackend);
        let store = VectorStore::new(&test_config(), backend, Arc::new(KeyedEmbedder::new())).unwrap();
        assert!(store.search("anything", &SearchOptions::top_k(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_filter_and_min_score() {
        let embedder = KeyedEmbedder::new()
            .with("query", unit(1.0))
            .with("task a", unit(0.9))
            .with("task b", unit(0.3))
            .with("event", unit(0.6));
        let (store, _) = store_with(embedder);
        store
            .add("task a", Metadata::new().with("memory_type", "task"))
            .await
            .unwrap();
        store
            .add("task b", Metadata::new().with("memory_type", "task"))
            .await
            .unwrap();
        store
            .add("event", Metadata::new().with("memory_type", "event"))
            .await
            .unwrap();

        let options = SearchOptions::top_k(5)
            .with_filter(MetadataFilter::new().eq("memory_type", "task"))
            .with_min_score(0.5);
        let hits = store.search("query", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.text, "task a");
    }

    #[tokio::test]
    async fn test_add_rejects_empty_and_surfaces_backend_errors() {
        let (store, _) = store_with(KeyedEmbedder::new());
        assert!(matches!(
            store.add("   ", Metadata::new()).await,
            Err(MemoryError::InvalidInput(_))
        ));

        let failing = VectorStore::new(
            &test_config(),
            Arc::new(FailingVectorBackend),
            Arc::new(KeyedEmbedder::new()),
        )
        .unwrap();
        let err = failing.add("hello", Metadata::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[tokio::test]
    async fn test_recent_newest_first() {
        let (store, _) = store_with(KeyedEmbedder::new());
        store.add("first memory", Metadata::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.add("second memory", Metadata::new()).await.unwrap();
        let recent = store.recent(1, MetadataFilter::new()).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "second memory");
    }

    #[tokio::test]
    async fn test_supersede_links_both_records() {
        let (store, _) = store_with(KeyedEmbedder::new());
        let old = store.add("Deploys run on Fridays", Metadata::new()).await.unwrap();
        let outcome = store
            .supersede(old.id, "Deploys run on Mondays", Metadata::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.record.metadata.get(SUPERSEDES_KEY),
            Some(&MetadataValue::from(old.id.to_string()))
        );
        let previous = store.get(old.id).await.unwrap();
        assert_eq!(
            previous.metadata.get(STATUS_KEY).and_then(MetadataValue::as_text),
            Some(SUPERSEDED)
        );
        assert_eq!(previous.text, old.text);

        let missing = store
            .supersede(MemoryId::from_content("never stored"), "whatever", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(missing, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_readding_superseded_text_stores_active_record() {
        let (store, _) = store_with(KeyedEmbedder::new());
        let old = store.add("Standup is at 9", Metadata::new()).await.unwrap();
        store
            .supersede(old.id, "Standup is at 10", Metadata::new())
            .await
            .unwrap();

        let again = store.add("Standup is at 9", Metadata::new()).await.unwrap();
        assert_eq!(again.id, old.id);
        assert!(!is_superseded(&again));
        assert!(!is_superseded(&store.get(old.id).await.unwrap()));

        let hits = store.search("Standup is at 9", &SearchOptions::top_k(1)).await.unwrap();
        assert_eq!(hits[0].record.id, old.id);
        assert!(!is_superseded(&hits[0].record));
    }

    #[tokio::test]
    async fn test_superseded_records_hidden_from_search_and_dedupe() {
        let embedder = KeyedEmbedder::new()
            .with("Deploys run on Fridays", unit(1.0))
            .with("Deploys run on Mondays", unit(0.2))
            .with("deploys happen fridays", unit(0.999));
        let (store, backend) = store_with(embedder);
        let old = store.add("Deploys run on Fridays", Metadata::new()).await.unwrap();
        store
            .supersede(old.id, "Deploys run on Mondays", Metadata::new())
            .await
            .unwrap();

        let hits = store
            .search("Deploys run on Fridays", &SearchOptions::top_k(5))
            .await
            .unwrap();
        assert!(hits.iter().all(|hit| hit.record.id != old.id));

        let all = store
            .search("Deploys run on Fridays", &SearchOptions::top_k(5).with_superseded())
            .await
            .unwrap();
        assert_eq!(all[0].record.id, old.id);

        let only_superseded = SearchOptions::top_k(5)
            .with_filter(MetadataFilter::new().eq(STATUS_KEY, SUPERSEDED));
        let hits = store.search("Deploys run on Fridays", &only_superseded).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, old.id);

        let paraphrase = store.add("deploys happen fridays", Metadata::new()).await.unwrap();
        assert_ne!(paraphrase.id, old.id);
        assert_eq!(backend.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stats_reports_shape() {
        let (store, _) = store_with(KeyedEmbedder::new());
        store.add("one", Metadata::new()).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.embedding_dim, test_config().embedding.ndims);
        assert_eq!(stats.collection_name, "test");
    }
}
