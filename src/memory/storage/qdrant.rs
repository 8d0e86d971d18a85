//! Qdrant REST backend for memory records.
//!
//! Records are stored as points keyed by their content-derived UUID. The
//! payload holds the user metadata at top level next to a few reserved
//! `_hm_` fields (text and creation time), which keeps metadata filters as
//! plain payload conditions.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::memory::core::config::VectorConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::metadata::{Metadata, MetadataValue, RESERVED_PREFIX};
use crate::memory::core::record::MemoryRecord;
use crate::memory::retrieval::search::MetadataFilter;
use crate::memory::storage::vector_store::{StoreFuture, VectorBackend, VectorHit, VectorQuery};

const BACKEND: &str = "qdrant";
const TEXT_FIELD: &str = "_hm_text";
const CREATED_AT_FIELD: &str = "_hm_created_at";
const CREATED_AT_MS_FIELD: &str = "_hm_created_at_ms";

/// Vector backend speaking the Qdrant REST API.
#[derive(Clone, Debug)]
pub struct QdrantBackend {
    client: reqwest::Client,
    base_url: url::Url,
    collection: String,
    api_key: Option<String>,
}

impl QdrantBackend {
    /// Build a backend from config. No request is made until first use.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &VectorConfig) -> MemoryResult<Self> {
        let base_url = url::Url::parse(&config.url)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| MemoryError::store(BACKEND, err))?;
        Ok(Self {
            client,
            base_url,
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> MemoryResult<RequestBuilder> {
        let url = self
            .base_url
            .join(&format!("collections/{}{path}", self.collection))?;
        let builder = self.client.request(method, url);
        Ok(match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> MemoryResult<Option<Value>> {
        let response = builder
            .send()
            .await
            .map_err(|err| MemoryError::store(BACKEND, err))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::store(
                BACKEND,
                format!("status {status}: {}", body.trim()),
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| MemoryError::store(BACKEND, format!("malformed response: {err}")))?;
        Ok(Some(body))
    }

    async fn send_expecting(&self, builder: RequestBuilder, what: &str) -> MemoryResult<Value> {
        self.send(builder).await?.ok_or_else(|| {
            MemoryError::store(BACKEND, format!("{what}: collection {} not found", self.collection))
        })
    }

    async fn create_collection(&self, ndims: usize) -> MemoryResult<()> {
        let body = json!({ "vectors": { "size": ndims, "distance": "Cosine" } });
        self.send_expecting(self.request(Method::PUT, "")?.json(&body), "create collection")
            .await?;

        let index = json!({ "field_name": CREATED_AT_MS_FIELD, "field_schema": "integer" });
        self.send_expecting(
            self.request(Method::PUT, "/index")?.json(&index),
            "create payload index",
        )
        .await?;
        info!(collection = %self.collection, ndims, "created qdrant collection");
        Ok(())
    }
}

impl VectorBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn ensure_collection(&self, ndims: usize) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let Some(info) = self.send(self.request(Method::GET, "")?).await? else {
                return self.create_collection(ndims).await;
            };
            match collection_dimension(&info) {
                Some(existing) if existing != ndims => Err(MemoryError::InvalidConfig(format!(
                    "collection {} has dimension {existing}, configured {ndims}",
                    self.collection
                ))),
                Some(_) => Ok(()),
                None => {
                    warn!(collection = %self.collection, "could not read collection dimension");
                    Ok(())
                }
            }
        })
    }

    fn upsert(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let body = json!({
                "points": [{
                    "id": record.id.to_string(),
                    "vector": record.embedding,
                    "payload": record_payload(&record),
                }]
            });
            self.send_expecting(
                self.request(Method::PUT, "/points?wait=true")?.json(&body),
                "upsert",
            )
            .await?;
            debug!(memory_id = %record.id, "upserted qdrant point");
            Ok(())
        })
    }

    fn search(&self, query: VectorQuery) -> StoreFuture<'_, MemoryResult<Vec<VectorHit>>> {
        Box::pin(async move {
            let mut body = json!({
                "vector": query.vector,
                "limit": query.limit,
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(filter) = build_filter(&query.filter, &query.exclude) {
                body["filter"] = filter;
            }
            if let Some(min_score) = query.min_score {
                body["score_threshold"] = json!(min_score);
            }
            let response = self
                .send_expecting(self.request(Method::POST, "/points/search")?.json(&body), "search")
                .await?;
            parse_search_response(response)
        })
    }

    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>> {
        Box::pin(async move {
            let body = json!({ "ids": [id.to_string()], "with_payload": true, "with_vector": true });
            let response = self
                .send_expecting(self.request(Method::POST, "/points")?.json(&body), "get")
                .await?;
            let points: QdrantResponse<Vec<QdrantPoint>> = serde_json::from_value(response)?;
            points
                .result
                .into_iter()
                .next()
                .map(QdrantPoint::into_record)
                .transpose()
        })
    }

    fn recent(
        &self,
        limit: usize,
        filter: MetadataFilter,
    ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            let mut body = json!({
                "limit": limit,
                "with_payload": true,
                "with_vector": true,
                "order_by": { "key": CREATED_AT_MS_FIELD, "direction": "desc" },
            });
            if let Some(filter) = build_filter(&filter, &MetadataFilter::new()) {
                body["filter"] = filter;
            }
            let response = self
                .send_expecting(self.request(Method::POST, "/points/scroll")?.json(&body), "scroll")
                .await?;
            let page: QdrantResponse<ScrollPage> = serde_json::from_value(response)?;
            page.result
                .points
                .into_iter()
                .map(QdrantPoint::into_record)
                .collect()
        })
    }

    fn count(&self) -> StoreFuture<'_, MemoryResult<u64>> {
        Box::pin(async move {
            let body = json!({ "exact": true });
            let response = self
                .send_expecting(self.request(Method::POST, "/points/count")?.json(&body), "count")
                .await?;
            let count: QdrantResponse<CountResult> = serde_json::from_value(response)?;
            Ok(count.result.count)
        })
    }
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ScrollPage {
    #[serde(default)]
    points: Vec<QdrantPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: Value,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
    #[serde(default)]
    vector: Option<Vec<f64>>,
}

impl QdrantPoint {
    fn into_record(self) -> MemoryResult<MemoryRecord> {
        let id = self
            .id
            .as_str()
            .and_then(|raw| raw.parse::<MemoryId>().ok())
            .ok_or_else(|| MemoryError::store(BACKEND, format!("unexpected point id {}", self.id)))?;
        let payload = self.payload.unwrap_or_default();
        let text = payload
            .get(TEXT_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| MemoryError::store(BACKEND, format!("point {id} has no text")))?
            .to_string();
        let created_at = payload_created_at(&payload).unwrap_or_else(Utc::now);
        Ok(MemoryRecord {
            id,
            text,
            embedding: self.vector.unwrap_or_default(),
            metadata: payload_metadata(id, &payload),
            created_at,
        })
    }
}

fn record_payload(record: &MemoryRecord) -> Map<String, Value> {
    let mut payload = record.metadata.to_json();
    payload.insert(TEXT_FIELD.to_string(), Value::String(record.text.clone()));
    payload.insert(
        CREATED_AT_FIELD.to_string(),
        Value::String(record.created_at.to_rfc3339()),
    );
    payload.insert(
        CREATED_AT_MS_FIELD.to_string(),
        json!(record.created_at.timestamp_millis()),
    );
    payload
}

fn payload_created_at(payload: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if let Some(raw) = payload.get(CREATED_AT_FIELD).and_then(Value::as_str)
        && let Ok(parsed) = DateTime::parse_from_rfc3339(raw)
    {
        return Some(parsed.with_timezone(&Utc));
    }
    payload
        .get(CREATED_AT_MS_FIELD)
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn payload_metadata(id: MemoryId, payload: &Map<String, Value>) -> Metadata {
    payload
        .iter()
        .filter(|(key, _)| !key.starts_with(RESERVED_PREFIX))
        .filter_map(|(key, raw)| match MetadataValue::from_json(key, raw) {
            Ok(value) => value.map(|value| (key.clone(), value)),
            Err(err) => {
                warn!(memory_id = %id, error = %err, "skipping payload field");
                None
            }
        })
        .collect()
}

fn build_filter(filter: &MetadataFilter, exclude: &MetadataFilter) -> Option<Value> {
    if filter.is_empty() && exclude.is_empty() {
        return None;
    }
    let mut clauses = serde_json::Map::new();
    if !filter.is_empty() {
        clauses.insert("must".to_string(), Value::Array(conditions(filter)));
    }
    if !exclude.is_empty() {
        clauses.insert("must_not".to_string(), Value::Array(conditions(exclude)));
    }
    Some(Value::Object(clauses))
}

/// Numbers become closed ranges so integers and floats match by value.
fn conditions(filter: &MetadataFilter) -> Vec<Value> {
    filter
        .conditions()
        .map(|(key, value)| match value {
            MetadataValue::Float(_) | MetadataValue::Integer(_) => {
                let number = value.to_json();
                json!({ "key": key, "range": { "gte": number, "lte": number } })
            }
            other => json!({ "key": key, "match": { "value": other.to_json() } }),
        })
        .collect()
}

fn collection_dimension(info: &Value) -> Option<usize> {
    info.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .and_then(|size| usize::try_from(size).ok())
}

fn parse_search_response(response: Value) -> MemoryResult<Vec<VectorHit>> {
    let points: QdrantResponse<Vec<QdrantPoint>> = serde_json::from_value(response)?;
    points
        .result
        .into_iter()
        .map(|point| {
            let score = point.score.unwrap_or_default();
            point.into_record().map(|record| VectorHit { score, record })
        })
        .collect()
}
