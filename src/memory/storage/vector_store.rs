//! Vector backend contract for semantic memory records.

use std::future::Future;
use std::pin::Pin;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::MemoryRecord;
use crate::memory::retrieval::search::MetadataFilter;

/// Boxed future type for storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Record returned by a similarity search with its cosine score.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorHit {
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
    /// Retrieved record, embedding included.
    pub record: MemoryRecord,
}

/// Nearest-neighbour query.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorQuery {
    /// Query embedding.
    pub vector: Vec<f64>,
    /// Maximum number of hits.
    pub limit: usize,
    /// Metadata equality filter.
    pub filter: MetadataFilter,
    /// Drop records matching any of these conditions.
    pub exclude: MetadataFilter,
    /// Drop hits scoring below this value.
    pub min_score: Option<f64>,
}

/// Vector database abstraction for memory records.
///
/// Upserts are keyed by record id and must be atomic per point.
pub trait VectorBackend: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Collection holding the records.
    fn collection(&self) -> &str;

    /// Create the collection if missing, checking its dimension otherwise.
    ///
    /// # Errors
    /// Returns `Store` on backend failure or `InvalidConfig` on a dimension
    /// mismatch.
    fn ensure_collection(&self, ndims: usize) -> StoreFuture<'_, MemoryResult<()>>;

    /// Insert or replace a record.
    ///
    /// # Errors
    /// Returns `Store` if the record cannot be persisted.
    fn upsert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<()>>;

    /// Nearest records to a vector, best first.
    ///
    /// # Errors
    /// Returns `Store` if the query cannot be executed.
    fn search(&self, query: VectorQuery) -> StoreFuture<'_, MemoryResult<Vec<VectorHit>>>;

    /// Fetch a record by id.
    ///
    /// # Errors
    /// Returns `Store` if the lookup fails.
    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>>;

    /// Most recent records by creation time, newest first.
    ///
    /// # Errors
    /// Returns `Store` if the scroll fails.
    fn recent(
        &self,
        limit: usize,
        filter: MetadataFilter,
    ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>>;

    /// Number of stored records.
    ///
    /// # Errors
    /// Returns `Store` if the count fails.
    fn count(&self) -> StoreFuture<'_, MemoryResult<u64>>;
}
