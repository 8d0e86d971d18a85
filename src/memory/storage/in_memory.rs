//! Process-local vector backend for tests and local runs.

use std::sync::OnceLock;

use dashmap::DashMap;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::MemoryRecord;
use crate::memory::ingest::dedupe::cosine_similarity;
use crate::memory::retrieval::ranking::sort_by_score_then_recency;
use crate::memory::retrieval::search::MetadataFilter;
use crate::memory::storage::vector_store::{StoreFuture, VectorBackend, VectorHit, VectorQuery};

const BACKEND: &str = "in_memory_vector";

/// Vector backend holding records in a concurrent map, scored by brute force.
#[derive(Debug, Default)]
pub struct InMemoryVectorBackend {
    collection: String,
    ndims: OnceLock<usize>,
    records: DashMap<MemoryId, MemoryRecord>,
}

impl InMemoryVectorBackend {
    /// Empty backend with the given collection name.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ndims: OnceLock::new(),
            records: DashMap::new(),
        }
    }

    fn check_dimension(&self, len: usize) -> MemoryResult<()> {
        match self.ndims.get() {
            Some(&ndims) if ndims != len => Err(MemoryError::store(
                BACKEND,
                format!("vector dimension mismatch: expected {ndims}, got {len}"),
            )),
            _ => Ok(()),
        }
    }
}

impl VectorBackend for InMemoryVectorBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn ensure_collection(&self, ndims: usize) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let existing = *self.ndims.get_or_init(|| ndims);
            if existing != ndims {
                return Err(MemoryError::InvalidConfig(format!(
                    "collection {} has dimension {existing}, configured {ndims}",
                    self.collection
                )));
            }
            Ok(())
        })
    }

    fn upsert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            self.check_dimension(record.embedding.len())?;
            self.records.insert(record.id, record);
            Ok(())
        })
    }

    fn search(&self, query: VectorQuery) -> StoreFuture<'_, MemoryResult<Vec<VectorHit>>> {
        Box::pin(async move {
            self.check_dimension(query.vector.len())?;
            let mut hits: Vec<VectorHit> = self
                .records
                .iter()
                .filter(|entry| {
                    query.filter.matches(&entry.metadata)
                        && !query.exclude.matches_any(&entry.metadata)
                })
                .map(|entry| VectorHit {
                    score: cosine_similarity(&query.vector, &entry.embedding),
                    record: entry.value().clone(),
                })
                .filter(|hit| query.min_score.is_none_or(|min| hit.score >= min))
                .collect();
            sort_by_score_then_recency(&mut hits, |hit| (hit.score, hit.record.created_at));
            hits.truncate(query.limit);
            Ok(hits)
        })
    }

    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>> {
        Box::pin(async move { Ok(self.records.get(&id).map(|entry| entry.value().clone())) })
    }

    fn recent(
        &self,
        limit: usize,
        filter: MetadataFilter,
    ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            let mut records: Vec<MemoryRecord> = self
                .records
                .iter()
                .filter(|entry| filter.matches(&entry.metadata))
                .map(|entry| entry.value().clone())
                .collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(limit);
            Ok(records)
        })
    }

    fn count(&self) -> StoreFuture<'_, MemoryResult<u64>> {
        Box::pin(async move { Ok(self.records.len() as u64) })
    }
}
