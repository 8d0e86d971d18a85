//! Tool routes over the hybrid memory.
//!
//! Every operation is a `POST /tools/<name>` taking a JSON object of
//! arguments. Agent clients are sloppy with nested arguments, so `null`
//! fields are dropped and the whole argument object may arrive as a
//! JSON-encoded string. Stringified `metadata`, `properties` and `filter`
//! maps are handled by their own deserializers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::memory::core::errors::{ErrorKind, MemoryError};
use crate::memory::core::graph::{Direction, Entity, EntityView, Fact, RelatedEntity, Relationship};
use crate::memory::core::ids::{EntityKey, MemoryId};
use crate::memory::core::metadata::Metadata;
use crate::memory::core::record::MemoryRecord;
use crate::memory::engine::coordinator::{HybridStats, RecallResult};
use crate::memory::engine::record::{RecordReport, RecordRequest};
use crate::memory::engine::results::SearchResult;
use crate::memory::engine::vector_memory::Superseded;
use crate::memory::retrieval::search::{MetadataFilter, SearchOptions};
use crate::memory::storage::graph_store::GraphScope;

use super::state::AppState;

/// Limit used by listing tools when the call omits it.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools/memory_add", post(memory_add))
        .route("/tools/memory_search", post(memory_search))
        .route("/tools/memory_recent", post(memory_recent))
        .route("/tools/memory_stats", post(memory_stats))
        .route("/tools/memory_supersede", post(memory_supersede))
        .route("/tools/graph_add_entity", post(graph_add_entity))
        .route("/tools/graph_add_relationship", post(graph_add_relationship))
        .route("/tools/graph_add_fact", post(graph_add_fact))
        .route("/tools/graph_get_entity", post(graph_get_entity))
        .route("/tools/graph_get_facts", post(graph_get_facts))
        .route("/tools/graph_search", post(graph_search))
        .route("/tools/graph_get_related", post(graph_get_related))
        .route("/tools/recall", post(recall))
        .route("/tools/record", post(record))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "hybrid-memory",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Memory error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub MemoryError);

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error category.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput | ErrorKind::InvalidConfig => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::PartialRecord => StatusCode::MULTI_STATUS,
        ErrorKind::Embedding | ErrorKind::Store | ErrorKind::Rerank | ErrorKind::Unavailable => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": kind,
        });
        match &self.0 {
            MemoryError::RecordFailed(report) | MemoryError::PartialRecord(report) => {
                body["report"] = serde_json::to_value(report).unwrap_or(Value::Null);
            }
            MemoryError::RecallFailed { semantic, graph } => {
                body["semantic_error"] = json!(semantic);
                body["graph_error"] = json!(graph);
            }
            _ => {}
        }
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, %kind, "tool call failed");
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Decode tool arguments after normalizing agent quirks.
fn parse_args<T: DeserializeOwned>(mut args: Value) -> Result<T, ApiError> {
    if let Value::String(raw) = &args {
        args = serde_json::from_str(raw)
            .map_err(|err| MemoryError::InvalidInput(format!("arguments are not JSON: {err}")))?;
    }
    if args.is_null() {
        args = Value::Object(serde_json::Map::new());
    }
    strip_nulls(&mut args);
    serde_json::from_value(args)
        .map_err(|err| ApiError(MemoryError::InvalidInput(format!("invalid arguments: {err}"))))
}

#[derive(Debug, Deserialize)]
struct MemoryAddArgs {
    #[serde(alias = "content")]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

async fn memory_add(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<MemoryRecord> {
    let args: MemoryAddArgs = parse_args(args)?;
    Ok(Json(state.memory.vector().add(&args.text, args.metadata).await?))
}

#[derive(Debug, Deserialize)]
struct MemorySearchArgs {
    query: String,
    top_k: Option<usize>,
    #[serde(default)]
    filter: MetadataFilter,
    min_score: Option<f64>,
    #[serde(default = "default_rerank")]
    rerank: bool,
    #[serde(default)]
    include_superseded: bool,
}

const fn default_rerank() -> bool {
    true
}

/// Results of `memory_search` and `graph_search`.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Results, best first.
    pub results: Vec<SearchResult>,
    /// Number of results.
    pub count: usize,
    /// Whether a reranker ordered the results.
    pub reranked: bool,
}

async fn memory_search(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<SearchResponse> {
    let args: MemorySearchArgs = parse_args(args)?;
    let mut options =
        SearchOptions::top_k(args.top_k.unwrap_or(state.default_top_k)).with_filter(args.filter);
    if let Some(min_score) = args.min_score {
        options = options.with_min_score(min_score);
    }
    if args.include_superseded {
        options = options.with_superseded();
    }
    let found = state
        .memory
        .search_memory(&args.query, &options, args.rerank)
        .await?;
    Ok(Json(SearchResponse {
        count: found.results.len(),
        results: found.results,
        reranked: found.reranked,
    }))
}

#[derive(Debug, Deserialize)]
struct MemoryRecentArgs {
    limit: Option<usize>,
    #[serde(default)]
    filter: MetadataFilter,
}

/// Records listed by `memory_recent`.
#[derive(Debug, Serialize)]
pub struct RecentResponse {
    /// Records, newest first.
    pub memories: Vec<MemoryRecord>,
    /// Number of records.
    pub count: usize,
}

async fn memory_recent(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<RecentResponse> {
    let args: MemoryRecentArgs = parse_args(args)?;
    let memories = state
        .memory
        .vector()
        .recent(args.limit.unwrap_or(DEFAULT_LIST_LIMIT), args.filter)
        .await?;
    Ok(Json(RecentResponse {
        count: memories.len(),
        memories,
    }))
}

async fn memory_stats(State(state): State<Arc<AppState>>) -> ApiResult<HybridStats> {
    Ok(Json(state.memory.stats().await?))
}

#[derive(Debug, Deserialize)]
struct MemorySupersedeArgs {
    old_id: MemoryId,
    #[serde(alias = "content", alias = "new_text")]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

async fn memory_supersede(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<Superseded> {
    let args: MemorySupersedeArgs = parse_args(args)?;
    let outcome = state
        .memory
        .vector()
        .supersede(args.old_id, &args.text, args.metadata)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct EntityArgs {
    name: String,
    #[serde(rename = "type", alias = "entity_type")]
    entity_type: String,
    #[serde(default)]
    properties: Metadata,
}

async fn graph_add_entity(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<Entity> {
    let args: EntityArgs = parse_args(args)?;
    let entity = state
        .memory
        .graph()
        .add_entity(&args.name, &args.entity_type, args.properties)
        .await?;
    Ok(Json(entity))
}

#[derive(Debug, Deserialize)]
struct RelationshipArgs {
    source: EntityKey,
    target: EntityKey,
    #[serde(rename = "type", alias = "relationship")]
    relation_type: String,
    #[serde(default)]
    properties: Metadata,
}

async fn graph_add_relationship(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<Relationship> {
    let args: RelationshipArgs = parse_args(args)?;
    let edge = state
        .memory
        .graph()
        .add_relationship(args.source, args.target, &args.relation_type, args.properties)
        .await?;
    Ok(Json(edge))
}

#[derive(Debug, Deserialize)]
struct FactArgs {
    subject: String,
    predicate: String,
    object: String,
    confidence: Option<f64>,
    context: Option<String>,
}

async fn graph_add_fact(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<Fact> {
    let args: FactArgs = parse_args(args)?;
    let fact = state
        .memory
        .graph()
        .add_fact(
            &args.subject,
            &args.predicate,
            &args.object,
            args.confidence,
            args.context,
        )
        .await?;
    Ok(Json(fact))
}

async fn graph_get_entity(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<EntityView> {
    let key: EntityKey = parse_args(args)?;
    Ok(Json(state.memory.graph().get_entity(key).await?))
}

#[derive(Debug, Deserialize)]
struct FactsArgs {
    subject: String,
    limit: Option<usize>,
}

/// Facts listed by `graph_get_facts`.
#[derive(Debug, Serialize)]
pub struct FactsResponse {
    /// Facts, most recent first.
    pub facts: Vec<Fact>,
    /// Number of facts.
    pub count: usize,
}

async fn graph_get_facts(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<FactsResponse> {
    let args: FactsArgs = parse_args(args)?;
    let facts = state
        .memory
        .graph()
        .get_facts(&args.subject, args.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(FactsResponse {
        count: facts.len(),
        facts,
    }))
}

#[derive(Debug, Deserialize)]
struct GraphSearchArgs {
    query: String,
    #[serde(alias = "top_k")]
    limit: Option<usize>,
    #[serde(default, alias = "search_type")]
    scope: GraphScope,
    entity_type: Option<String>,
}

async fn graph_search(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<SearchResponse> {
    let args: GraphSearchArgs = parse_args(args)?;
    let results = state
        .memory
        .graph()
        .search_scoped(
            &args.query,
            args.limit.unwrap_or(state.default_top_k),
            args.scope,
            args.entity_type.as_deref(),
        )
        .await?;
    Ok(Json(SearchResponse {
        count: results.len(),
        results,
        reranked: false,
    }))
}

#[derive(Debug, Deserialize)]
struct RelatedArgs {
    name: String,
    #[serde(rename = "type", alias = "entity_type")]
    entity_type: String,
    max_hops: Option<usize>,
    #[serde(default, alias = "relationship_types")]
    relation_types: Vec<String>,
    #[serde(default)]
    direction: Direction,
}

/// Entities listed by `graph_get_related`.
#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    /// Reached entities in BFS order.
    pub related: Vec<RelatedEntity>,
    /// Number of entities.
    pub count: usize,
}

async fn graph_get_related(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<RelatedResponse> {
    let args: RelatedArgs = parse_args(args)?;
    let key = EntityKey::new(&args.name, &args.entity_type)?;
    let related = state
        .memory
        .graph()
        .get_related(key, args.max_hops, &args.relation_types, args.direction)
        .await?;
    Ok(Json(RelatedResponse {
        count: related.len(),
        related,
    }))
}

#[derive(Debug, Deserialize)]
struct RecallArgs {
    query: String,
    top_k: Option<usize>,
}

async fn recall(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<RecallResult> {
    let args: RecallArgs = parse_args(args)?;
    let result = state
        .memory
        .recall(&args.query, args.top_k.unwrap_or(state.default_top_k))
        .await?;
    Ok(Json(result))
}

async fn record(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> ApiResult<RecordReport> {
    let request: RecordRequest = parse_args(args)?;
    Ok(Json(state.memory.record(request).await?))
}
