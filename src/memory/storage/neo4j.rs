//! Neo4j backend over the HTTP transactional Cypher endpoint.
//!
//! Entities are `:Entity {name, type}` nodes, relationships are `:RELATES`
//! edges carrying their label in a `type` property, and facts are standalone
//! `:Fact {subject, predicate, object}` nodes. Every upsert is a single
//! `MERGE` statement, so concurrent writers of the same key converge on one
//! element. Timestamps are stored as epoch milliseconds under reserved keys.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::memory::core::config::GraphConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::graph::{
    Direction, Entity, EntityView, Fact, GraphHit, GraphStats, RelatedEntity, Relationship,
    TraversalQuery,
};
use crate::memory::core::ids::EntityKey;
use crate::memory::core::metadata::{Metadata, MetadataValue, RESERVED_PREFIX};
use crate::memory::storage::graph_store::{GraphBackend, GraphTextQuery};
use crate::memory::storage::vector_store::StoreFuture;

const BACKEND: &str = "neo4j";
const CREATED_AT: &str = "_hm_created_at";
const UPDATED_AT: &str = "_hm_updated_at";

const SCHEMA: [&str; 2] = [
    "CREATE INDEX entity_key IF NOT EXISTS FOR (n:Entity) ON (n.name, n.type)",
    "CREATE INDEX fact_subject IF NOT EXISTS FOR (f:Fact) ON (f.subject)",
];

const UPSERT_NODE: &str = "\
MERGE (n:Entity {name: $name, type: $type})
ON CREATE SET n._hm_created_at = $now
SET n += $props, n.name = $name, n.type = $type, n._hm_updated_at = $now
RETURN properties(n)";

const GET_NODE: &str = "MATCH (n:Entity {name: $name, type: $type}) RETURN properties(n)";

const NODE_EXISTS: &str =
    "OPTIONAL MATCH (n:Entity {name: $name, type: $type}) RETURN n IS NOT NULL";

const UPSERT_EDGE_AUTO: &str = "\
MERGE (a:Entity {name: $source_name, type: $source_type})
ON CREATE SET a._hm_created_at = $now, a._hm_updated_at = $now
MERGE (b:Entity {name: $target_name, type: $target_type})
ON CREATE SET b._hm_created_at = $now, b._hm_updated_at = $now
MERGE (a)-[r:RELATES {type: $rel_type}]->(b)
ON CREATE SET r._hm_created_at = $now
SET r += $props, r.type = $rel_type, r._hm_updated_at = $now
RETURN properties(r)";

const UPSERT_EDGE_STRICT: &str = "\
MATCH (a:Entity {name: $source_name, type: $source_type})
MATCH (b:Entity {name: $target_name, type: $target_type})
MERGE (a)-[r:RELATES {type: $rel_type}]->(b)
ON CREATE SET r._hm_created_at = $now
SET r += $props, r.type = $rel_type, r._hm_updated_at = $now
RETURN properties(r)";

const OUTGOING_EDGES: &str = "\
MATCH (n:Entity {name: $name, type: $type})-[r:RELATES]->(m:Entity)
RETURN properties(r), m.name, m.type ORDER BY r._hm_created_at";

const INCOMING_EDGES: &str = "\
MATCH (n:Entity {name: $name, type: $type})<-[r:RELATES]-(m:Entity)
RETURN properties(r), m.name, m.type ORDER BY r._hm_created_at";

// Candidates are ranked by matched terms plus the phrase bonus before the
// limit applies, mirroring the scoring done in the graph store.
const SEARCH_ENTITIES: &str = "\
MATCH (n:Entity)
WHERE $entity_type IS NULL OR n.type = $entity_type
WITH n, size([t IN $terms WHERE toLower(n.name) CONTAINS t OR toLower(n.type) CONTAINS t]) AS matched,
    (toLower(n.name) CONTAINS $phrase OR toLower(n.type) CONTAINS $phrase) AS phrase_hit
WHERE matched > 0
RETURN properties(n)
ORDER BY matched + CASE WHEN phrase_hit THEN size($terms) * 0.5 ELSE 0 END DESC,
    n._hm_updated_at DESC
LIMIT $limit";

const SEARCH_FACTS: &str = "\
MATCH (f:Fact)
WITH f, size([t IN $terms WHERE toLower(f.subject) CONTAINS t
        OR toLower(f.predicate) CONTAINS t OR toLower(f.object) CONTAINS t]) AS matched,
    (toLower(f.subject) CONTAINS $phrase OR toLower(f.predicate) CONTAINS $phrase
        OR toLower(f.object) CONTAINS $phrase) AS phrase_hit
WHERE matched > 0
RETURN properties(f)
ORDER BY matched + CASE WHEN phrase_hit THEN size($terms) * 0.5 ELSE 0 END DESC,
    f._hm_created_at DESC
LIMIT $limit";

const UPSERT_FACT: &str = "\
MERGE (f:Fact {subject: $subject, predicate: $predicate, object: $object})
SET f.confidence = $confidence, f.context = $context, f._hm_created_at = $now
RETURN properties(f)";

const GET_FACTS: &str = "\
MATCH (f:Fact {subject: $subject})
RETURN properties(f) ORDER BY f._hm_created_at DESC LIMIT $limit";

const COUNT_ENTITIES: &str = "MATCH (n:Entity) RETURN count(n)";
const COUNT_RELATIONSHIPS: &str = "MATCH (:Entity)-[r:RELATES]->(:Entity) RETURN count(r)";
const COUNT_FACTS: &str = "MATCH (f:Fact) RETURN count(f)";

/// Graph backend speaking the Neo4j HTTP transactional API.
#[derive(Clone, Debug)]
pub struct Neo4jBackend {
    client: reqwest::Client,
    endpoint: url::Url,
    user: String,
    password: String,
}

impl Neo4jBackend {
    /// Build a backend from config. No request is made until first use.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &GraphConfig) -> MemoryResult<Self> {
        let endpoint =
            url::Url::parse(&config.url)?.join(&format!("db/{}/tx/commit", config.database))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| MemoryError::store(BACKEND, err))?;
        Ok(Self {
            client,
            endpoint,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    async fn run(&self, statements: Vec<Statement>) -> MemoryResult<Vec<StatementResult>> {
        let expected = statements.len();
        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await
            .map_err(|err| MemoryError::store(BACKEND, err))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MemoryError::store(BACKEND, format!("authentication failed: {status}")));
        }
        if !status.is_success() {
            return Err(MemoryError::store(BACKEND, format!("status {status}")));
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|err| MemoryError::store(BACKEND, format!("malformed response: {err}")))?;
        body.into_results(expected)
    }
}

#[derive(Debug, Serialize)]
struct Statement {
    statement: String,
    parameters: Value,
}

impl Statement {
    fn new(statement: &str, parameters: Value) -> Self {
        Self {
            statement: statement.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

impl TxResponse {
    fn into_results(self, expected: usize) -> MemoryResult<Vec<StatementResult>> {
        if let Some(error) = self.errors.first() {
            return Err(MemoryError::store(
                BACKEND,
                format!("{}: {}", error.code, error.message),
            ));
        }
        if self.results.len() != expected {
            return Err(MemoryError::store(
                BACKEND,
                format!("expected {expected} results, got {}", self.results.len()),
            ));
        }
        Ok(self.results)
    }
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<DataRow>,
}

impl StatementResult {
    fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.data.iter().map(|row| row.row.as_slice())
    }

    fn first_cell(&self) -> Option<&Value> {
        self.data.first().and_then(|row| row.row.first())
    }
}

#[derive(Debug, Deserialize)]
struct DataRow {
    #[serde(default)]
    row: Vec<Value>,
}

fn key_params(key: &EntityKey) -> Value {
    json!({ "name": key.name, "type": key.entity_type })
}

fn millis(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}

fn as_object<'a>(value: &'a Value, what: &str) -> MemoryResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| MemoryError::store(BACKEND, format!("{what} row is not a map")))
}

fn string_field(props: &Map<String, Value>, field: &str) -> MemoryResult<String> {
    props
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MemoryError::store(BACKEND, format!("missing `{field}` property")))
}

fn user_properties(props: &Map<String, Value>, identity: &[&str]) -> Metadata {
    props
        .iter()
        .filter(|(key, _)| !key.starts_with(RESERVED_PREFIX) && !identity.contains(&key.as_str()))
        .filter_map(|(key, raw)| match MetadataValue::from_json(key, raw) {
            Ok(value) => value.map(|value| (key.clone(), value)),
            Err(err) => {
                warn!(property = %key, error = %err, "skipping graph property");
                None
            }
        })
        .collect()
}

fn entity_from_props(value: &Value) -> MemoryResult<Entity> {
    let props = as_object(value, "entity")?;
    Ok(Entity {
        name: string_field(props, "name")?,
        entity_type: string_field(props, "type")?,
        properties: user_properties(props, &["name", "type"]),
        created_at: millis(props.get(CREATED_AT)),
        updated_at: millis(props.get(UPDATED_AT)),
    })
}

fn relationship_from_props(
    value: &Value,
    source: EntityKey,
    target: EntityKey,
) -> MemoryResult<Relationship> {
    let props = as_object(value, "relationship")?;
    Ok(Relationship {
        source,
        target,
        relation_type: string_field(props, "type")?,
        properties: user_properties(props, &["type"]),
        created_at: millis(props.get(CREATED_AT)),
        updated_at: millis(props.get(UPDATED_AT)),
    })
}

fn fact_from_props(value: &Value) -> MemoryResult<Fact> {
    let props = as_object(value, "fact")?;
    Ok(Fact {
        subject: string_field(props, "subject")?,
        predicate: string_field(props, "predicate")?,
        object: string_field(props, "object")?,
        confidence: props.get("confidence").and_then(Value::as_f64),
        context: props
            .get("context")
            .and_then(Value::as_str)
            .map(str::to_string),
        created_at: millis(props.get(CREATED_AT)),
    })
}

fn neighbour_edges(
    result: &StatementResult,
    key: &EntityKey,
    outgoing: bool,
) -> MemoryResult<Vec<Relationship>> {
    result
        .rows()
        .map(|row| {
            let [props, name, entity_type] = row else {
                return Err(MemoryError::store(BACKEND, "edge row has unexpected shape"));
            };
            let other = EntityKey {
                name: name.as_str().unwrap_or_default().to_string(),
                entity_type: entity_type.as_str().unwrap_or_default().to_string(),
            };
            if outgoing {
                relationship_from_props(props, key.clone(), other)
            } else {
                relationship_from_props(props, other, key.clone())
            }
        })
        .collect()
}

fn node_exists(result: &StatementResult) -> bool {
    result.first_cell().and_then(Value::as_bool).unwrap_or(false)
}

fn count(result: &StatementResult) -> u64 {
    result.first_cell().and_then(Value::as_u64).unwrap_or(0)
}

/// Variable-length pattern for a traversal. Hop counts cannot be
/// parameterized in Cypher, so the clamped value is formatted in.
fn traversal_pattern(direction: Direction, max_hops: usize) -> String {
    match direction {
        Direction::Outgoing => format!("-[:RELATES*1..{max_hops}]->"),
        Direction::Incoming => format!("<-[:RELATES*1..{max_hops}]-"),
        Direction::Both => format!("-[:RELATES*1..{max_hops}]-"),
    }
}

/// One row per reached entity with its shortest path's length and
/// relationship types.
fn traversal_statement(query: &TraversalQuery) -> String {
    format!(
        "MATCH (o:Entity {{name: $name, type: $type}})
MATCH p = (o){}(m:Entity)
WHERE m <> o AND all(r IN relationships(p) WHERE size($types) = 0 OR r.type IN $types)
WITH m, p ORDER BY length(p)
WITH m, head(collect(p)) AS p
RETURN properties(m), length(p) AS hops, [r IN relationships(p) | r.type] AS path
ORDER BY hops, m.name, m.type",
        traversal_pattern(query.direction, query.max_hops)
    )
}

fn search_params(query: &GraphTextQuery) -> Value {
    json!({
        "terms": query.keywords.terms(),
        "phrase": query.keywords.phrase(),
        "entity_type": query.entity_type,
        "limit": query.candidate_limit,
    })
}

impl GraphBackend for Neo4jBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn ensure_schema(&self) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let statements = SCHEMA
                .iter()
                .map(|s| Statement::new(s, json!({})))
                .collect();
            self.run(statements).await?;
            info!("neo4j schema ready");
            Ok(())
        })
    }

    fn upsert_node(&self, entity: Entity) -> StoreFuture<'_, MemoryResult<Entity>> {
        Box::pin(async move {
            let params = json!({
                "name": entity.name,
                "type": entity.entity_type,
                "props": entity.properties.to_json(),
                "now": entity.updated_at.timestamp_millis(),
            });
            let results = self.run(vec![Statement::new(UPSERT_NODE, params)]).await?;
            let row = results
                .first()
                .and_then(StatementResult::first_cell)
                .ok_or_else(|| MemoryError::store(BACKEND, "node upsert returned no row"))?;
            let stored = entity_from_props(row)?;
            debug!(entity = %stored.key(), "upserted neo4j node");
            Ok(stored)
        })
    }

    fn upsert_edge(
        &self,
        edge: Relationship,
        auto_create: bool,
    ) -> StoreFuture<'_, MemoryResult<Relationship>> {
        Box::pin(async move {
            let params = json!({
                "source_name": edge.source.name,
                "source_type": edge.source.entity_type,
                "target_name": edge.target.name,
                "target_type": edge.target.entity_type,
                "rel_type": edge.relation_type,
                "props": edge.properties.to_json(),
                "now": edge.updated_at.timestamp_millis(),
            });

            let results = if auto_create {
                self.run(vec![Statement::new(UPSERT_EDGE_AUTO, params)]).await?
            } else {
                let mut results = self
                    .run(vec![
                        Statement::new(NODE_EXISTS, key_params(&edge.source)),
                        Statement::new(NODE_EXISTS, key_params(&edge.target)),
                        Statement::new(UPSERT_EDGE_STRICT, params),
                    ])
                    .await?;
                for (index, endpoint) in [&edge.source, &edge.target].into_iter().enumerate() {
                    if !results.get(index).is_some_and(node_exists) {
                        return Err(MemoryError::NotFound(format!("entity {endpoint}")));
                    }
                }
                results.split_off(2)
            };

            let row = results
                .first()
                .and_then(StatementResult::first_cell)
                .ok_or_else(|| MemoryError::store(BACKEND, "edge upsert returned no row"))?;
            relationship_from_props(row, edge.source.clone(), edge.target.clone())
        })
    }

    fn get_entity_view(&self, key: EntityKey) -> StoreFuture<'_, MemoryResult<Option<EntityView>>> {
        Box::pin(async move {
            let params = key_params(&key);
            let results = self
                .run(vec![
                    Statement::new(GET_NODE, params.clone()),
                    Statement::new(OUTGOING_EDGES, params.clone()),
                    Statement::new(INCOMING_EDGES, params),
                ])
                .await?;
            let [node, outgoing, incoming] = results.as_slice() else {
                return Err(MemoryError::store(BACKEND, "entity view returned wrong shape"));
            };
            let Some(cell) = node.first_cell() else {
                return Ok(None);
            };
            Ok(Some(EntityView {
                entity: entity_from_props(cell)?,
                outgoing: neighbour_edges(outgoing, &key, true)?,
                incoming: neighbour_edges(incoming, &key, false)?,
            }))
        })
    }

    fn query_text(&self, query: GraphTextQuery) -> StoreFuture<'_, MemoryResult<Vec<GraphHit>>> {
        Box::pin(async move {
            let params = search_params(&query);
            let mut statements = Vec::new();
            if query.wants_entities() {
                statements.push(Statement::new(SEARCH_ENTITIES, params.clone()));
            }
            if query.wants_facts() {
                statements.push(Statement::new(SEARCH_FACTS, params));
            }
            if statements.is_empty() {
                return Ok(Vec::new());
            }
            let results = self.run(statements).await?;

            let mut hits = Vec::new();
            let mut results = results.iter();
            if query.wants_entities()
                && let Some(result) = results.next()
            {
                for row in result.rows() {
                    if let Some(cell) = row.first() {
                        hits.push(GraphHit::Entity(entity_from_props(cell)?));
                    }
                }
            }
            if query.wants_facts()
                && let Some(result) = results.next()
            {
                for row in result.rows() {
                    if let Some(cell) = row.first() {
                        hits.push(GraphHit::Fact(fact_from_props(cell)?));
                    }
                }
            }
            Ok(hits)
        })
    }

    fn bfs(&self, query: TraversalQuery) -> StoreFuture<'_, MemoryResult<Vec<RelatedEntity>>> {
        Box::pin(async move {
            let mut params = key_params(&query.origin);
            params["types"] = json!(query.relation_types);
            let results = self
                .run(vec![
                    Statement::new(NODE_EXISTS, key_params(&query.origin)),
                    Statement::new(&traversal_statement(&query), params),
                ])
                .await?;
            let [exists, paths] = results.as_slice() else {
                return Err(MemoryError::store(BACKEND, "traversal returned wrong shape"));
            };
            if !node_exists(exists) {
                return Err(MemoryError::NotFound(format!("entity {}", query.origin)));
            }

            paths
                .rows()
                .map(|row| {
                    let [props, hops, path] = row else {
                        return Err(MemoryError::store(BACKEND, "traversal row has unexpected shape"));
                    };
                    let path: Vec<String> = serde_json::from_value(path.clone())?;
                    let hops = hops
                        .as_u64()
                        .and_then(|h| usize::try_from(h).ok())
                        .unwrap_or(path.len());
                    Ok(RelatedEntity {
                        entity: entity_from_props(props)?,
                        hops,
                        path,
                    })
                })
                .collect()
        })
    }

    fn upsert_triple(&self, fact: Fact) -> StoreFuture<'_, MemoryResult<Fact>> {
        Box::pin(async move {
            let params = json!({
                "subject": fact.subject,
                "predicate": fact.predicate,
                "object": fact.object,
                "confidence": fact.confidence,
                "context": fact.context,
                "now": fact.created_at.timestamp_millis(),
            });
            let results = self.run(vec![Statement::new(UPSERT_FACT, params)]).await?;
            let row = results
                .first()
                .and_then(StatementResult::first_cell)
                .ok_or_else(|| MemoryError::store(BACKEND, "fact upsert returned no row"))?;
            fact_from_props(row)
        })
    }

    fn get_triples(&self, subject: String, limit: usize) -> StoreFuture<'_, MemoryResult<Vec<Fact>>> {
        Box::pin(async move {
            let params = json!({ "subject": subject, "limit": limit });
            let results = self.run(vec![Statement::new(GET_FACTS, params)]).await?;
            let Some(result) = results.first() else {
                return Ok(Vec::new());
            };
            result
                .rows()
                .filter_map(|row| row.first())
                .map(fact_from_props)
                .collect()
        })
    }

    fn stats(&self) -> StoreFuture<'_, MemoryResult<GraphStats>> {
        Box::pin(async move {
            let results = self
                .run(vec![
                    Statement::new(COUNT_ENTITIES, json!({})),
                    Statement::new(COUNT_RELATIONSHIPS, json!({})),
                    Statement::new(COUNT_FACTS, json!({})),
                ])
                .await?;
            let [entities, relationships, facts] = results.as_slice() else {
                return Err(MemoryError::store(BACKEND, "stats returned wrong shape"));
            };
            Ok(GraphStats {
                entities: count(entities),
                relationships: count(relationships),
                facts: count(facts),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::retrieval::ranking::KeywordQuery;
    use crate::memory::storage::graph_store::GraphScope;

    fn response(value: Value, expected: usize) -> MemoryResult<Vec<StatementResult>> {
        serde_json::from_value::<TxResponse>(value)
            .unwrap()
            .into_results(expected)
    }

    #[test]
    fn test_entity_row_strips_identity_and_reserved_keys() {
        let results = response(
            json!({
                "results": [{
                    "columns": ["properties(n)"],
                    "data": [{"row": [{
                        "name": "Alice",
                        "type": "Person",
                        "age": 30,
                        "city": "NYC",
                        "_hm_created_at": 1_700_000_000_000_i64,
                        "_hm_updated_at": 1_700_000_100_000_i64
                    }], "meta": [null]}]
                }],
                "errors": []
            }),
            1,
        )
        .unwrap();
        let entity = entity_from_props(results[0].first_cell().unwrap()).unwrap();
        assert_eq!(entity.name, "Alice");
        assert_eq!(entity.properties.len(), 2);
        assert_eq!(entity.created_at.timestamp_millis(), 1_700_000_000_000);
        assert!(entity.updated_at > entity.created_at);
    }

    #[test]
    fn test_cypher_errors_become_store_errors() {
        let err = response(
            json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input"
                }]
            }),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, MemoryError::Store { backend: "neo4j", .. }));
        assert!(err.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_neighbour_edges_fixture() {
        let results = response(
            json!({
                "results": [{
                    "columns": ["properties(r)", "m.name", "m.type"],
                    "data": [{"row": [{"type": "WORKS_AT", "since": 2020}, "Acme", "Company"]}]
                }],
                "errors": []
            }),
            1,
        )
        .unwrap();
        let alice = EntityKey::new("Alice", "Person").unwrap();
        let edges = neighbour_edges(&results[0], &alice, true).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation_type, "WORKS_AT");
        assert_eq!(edges[0].target.name, "Acme");
        assert_eq!(edges[0].properties.get("since"), Some(&MetadataValue::Integer(2020)));
    }

    #[test]
    fn test_traversal_pattern_per_direction() {
        assert_eq!(traversal_pattern(Direction::Outgoing, 2), "-[:RELATES*1..2]->");
        assert_eq!(traversal_pattern(Direction::Incoming, 3), "<-[:RELATES*1..3]-");
        let query = TraversalQuery {
            origin: EntityKey::new("A", "Node").unwrap(),
            max_hops: 5,
            relation_types: Vec::new(),
            direction: Direction::Both,
        };
        let statement = traversal_statement(&query);
        assert!(statement.contains("(o)-[:RELATES*1..5]-(m:Entity)"));
        assert!(statement.contains("[r IN relationships(p) | r.type] AS path"));
    }

    #[test]
    fn test_search_params_carry_phrase_and_type() {
        let query = GraphTextQuery {
            keywords: KeywordQuery::parse("Apollo  Project").unwrap(),
            scope: GraphScope::Both,
            entity_type: Some("Project".to_string()),
            candidate_limit: 10,
        };
        let params = search_params(&query);
        assert_eq!(params["terms"], json!(["apollo", "project"]));
        assert_eq!(params["phrase"], "apollo project");
        assert_eq!(params["entity_type"], "Project");
        assert!(!query.wants_facts());
        assert!(SEARCH_ENTITIES.find("ORDER BY") < SEARCH_ENTITIES.find("LIMIT"));
    }

    #[test]
    fn test_fact_row_fixture() {
        let fact = fact_from_props(&json!({
            "subject": "Alice",
            "predicate": "likes",
            "object": "tea",
            "confidence": 0.7,
            "_hm_created_at": 1_700_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(fact.confidence, Some(0.7));
        assert!(fact.context.is_none());
    }

    #[test]
    fn test_result_count_mismatch() {
        assert!(response(json!({"results": [], "errors": []}), 1).is_err());
    }
}
