//! Weaviate-backed [`VectorStore`] over the REST and GraphQL APIs.
//!
//! Schema and object writes use the REST surface (`/v1/schema`,
//! `/v1/objects`, `/v1/batch/references`); nearest-neighbor queries go
//! through `/v1/graphql` so filters and reference joins can be expressed in
//! one round trip. All vectors are supplied by the caller; collections are
//! created with `vectorizer: "none"`.

use crate::error::{Result, StoreError};
use crate::schema::CollectionSchema;
use crate::store::VectorStore;
use crate::types::{
    NearVectorQuery, QueryHit, RecordId, Reference, ResolvedReference, WhereFilter,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a Weaviate instance.
#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    /// Base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub timeout: Duration,
}

impl WeaviateConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn local() -> Self {
        Self::new("http://localhost:8080")
    }
}

pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
}

impl WeaviateStore {
    pub fn new(config: WeaviateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// REST body for one collection, matching the Weaviate schema API.
fn schema_class_body(schema: &CollectionSchema) -> Value {
    let mut properties: Vec<Value> = schema
        .properties
        .iter()
        .map(|p| {
            let mut body = json!({
                "name": p.name,
                "dataType": [p.data_type.wire_name()],
                "indexFilterable": p.filterable,
                "indexSearchable": p.searchable,
            });
            if let Some(tokenization) = p.tokenization {
                body["tokenization"] = json!(tokenization.as_str());
            }
            body
        })
        .collect();
    for reference in &schema.references {
        properties.push(json!({
            "name": reference.name,
            "dataType": [reference.target],
        }));
    }

    json!({
        "class": schema.name,
        "description": schema.description,
        "vectorizer": "none",
        "vectorIndexType": "hnsw",
        "vectorIndexConfig": { "distance": schema.distance.as_str() },
        "properties": properties,
    })
}

/// Beacon form Weaviate expects in batched reference payloads.
fn reference_batch_body(references: &[Reference]) -> Value {
    Value::Array(
        references
            .iter()
            .map(|r| {
                json!({
                    "from": format!(
                        "weaviate://localhost/{}/{}/{}",
                        r.from_collection, r.from_id, r.from_property
                    ),
                    "to": format!("weaviate://localhost/{}/{}", r.to_collection, r.to_id),
                })
            })
            .collect(),
    )
}

fn graphql_string_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| serde_json::to_string(v).unwrap_or_default())
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn where_clause(filter: &WhereFilter) -> String {
    match filter {
        WhereFilter::ContainsAny { path, values } => format!(
            "where: {{operator: ContainsAny, path: {}, valueText: {}}}",
            graphql_string_list(path),
            graphql_string_list(values)
        ),
    }
}

/// Builds the GraphQL `Get` query for a near-vector search.
fn near_vector_graphql(query: &NearVectorQuery) -> String {
    let vector = query
        .vector
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut args = format!("nearVector: {{vector: [{vector}]}}, limit: {}", query.limit);
    if let Some(filter) = &query.filter {
        let _ = write!(args, ", {}", where_clause(filter));
    }

    let mut fields = query.properties.join(" ");
    let _ = write!(fields, " _additional {{ id distance }}");
    if let Some(join) = &query.join {
        let _ = write!(
            fields,
            " {} {{ ... on {} {{ {} _additional {{ id }} }} }}",
            join.on_property,
            join.target_collection,
            join.properties.join(" ")
        );
    }

    format!(
        "{{ Get {{ {}({args}) {{ {fields} }} }} }}",
        query.collection
    )
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

fn additional_id(object: &Value) -> Option<RecordId> {
    object
        .get("_additional")
        .and_then(|a| a.get("id"))
        .and_then(Value::as_str)
        .map(|id| RecordId(id.to_string()))
}

/// Maps one GraphQL hit object back to a [`QueryHit`].
fn parse_hit(query: &NearVectorQuery, object: &Value) -> Result<QueryHit> {
    let id = additional_id(object)
        .ok_or_else(|| StoreError::QueryError("hit without _additional.id".to_string()))?;
    let distance = object
        .get("_additional")
        .and_then(|a| a.get("distance"))
        .and_then(Value::as_f64)
        .map(|d| d as f32);

    let properties: Map<String, Value> = query
        .properties
        .iter()
        .filter_map(|name| object.get(name).map(|v| (name.clone(), v.clone())))
        .collect();

    let references = match &query.join {
        Some(join) => object
            .get(&join.on_property)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|resolved| {
                let id = additional_id(resolved)?;
                let properties = join
                    .properties
                    .iter()
                    .filter_map(|name| resolved.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();
                Some(ResolvedReference { id, properties })
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(QueryHit {
        id,
        properties,
        distance,
        references,
    })
}

fn parse_graphql_hits(query: &NearVectorQuery, response: &GraphQlResponse) -> Result<Vec<QueryHit>> {
    if let Some(errors) = &response.errors {
        if !errors.is_empty() {
            return Err(StoreError::QueryError(format!(
                "graphql errors: {}",
                serde_json::to_string(errors)?
            )));
        }
    }
    let objects = response
        .data
        .as_ref()
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(&query.collection))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    objects.iter().map(|o| parse_hit(query, o)).collect()
}

async fn error_from_response(context: &str, response: reqwest::Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    StoreError::Other(format!("{context} failed with {status}: {body}"))
}

#[async_trait]
impl VectorStore for WeaviateStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/v1/schema/{name}")))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response("schema lookup", response).await),
        }
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        log::info!("creating collection '{}'", schema.name);
        let response = self
            .client
            .post(self.url("/v1/schema"))
            .json(&schema_class_body(schema))
            .send()
            .await?;
        if !response.status().is_success() {
            let err = error_from_response("collection create", response).await;
            return Err(StoreError::SchemaError(err.to_string()));
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        log::info!("deleting collection '{name}'");
        let response = self
            .client
            .delete(self.url(&format!("/v1/schema/{name}")))
            .send()
            .await?;
        // Absent collection is a no-op by contract.
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            let err = error_from_response("collection delete", response).await;
            return Err(StoreError::SchemaError(err.to_string()));
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        properties: Map<String, Value>,
        vector: &[f32],
    ) -> Result<RecordId> {
        let body = json!({
            "class": collection,
            "properties": properties,
            "vector": vector,
        });
        let response = self
            .client
            .post(self.url("/v1/objects"))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let err = error_from_response("object insert", response).await;
            return Err(StoreError::WriteError(err.to_string()));
        }

        #[derive(Deserialize)]
        struct InsertResponse {
            id: String,
        }
        let inserted: InsertResponse = response.json().await?;
        Ok(RecordId(inserted.id))
    }

    async fn add_references(&self, references: &[Reference]) -> Result<()> {
        if references.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.url("/v1/batch/references"))
            .json(&reference_batch_body(references))
            .send()
            .await?;
        if !response.status().is_success() {
            let err = error_from_response("batched reference add", response).await;
            return Err(StoreError::WriteError(err.to_string()));
        }

        // The batch endpoint reports per-item outcomes in a 200 body.
        let outcomes: Vec<Value> = response.json().await?;
        for outcome in &outcomes {
            let failed = outcome
                .get("result")
                .and_then(|r| r.get("status"))
                .and_then(Value::as_str)
                .is_some_and(|status| status.eq_ignore_ascii_case("failed"));
            if failed {
                return Err(StoreError::WriteError(format!(
                    "reference batch item failed: {}",
                    serde_json::to_string(outcome)?
                )));
            }
        }
        Ok(())
    }

    async fn query_near_vector(&self, query: &NearVectorQuery) -> Result<Vec<QueryHit>> {
        let graphql = near_vector_graphql(query);
        log::debug!("near-vector query on '{}': {graphql}", query.collection);
        let response = self
            .client
            .post(self.url("/v1/graphql"))
            .json(&json!({ "query": graphql }))
            .send()
            .await?;
        if !response.status().is_success() {
            let err = error_from_response("near-vector query", response).await;
            return Err(StoreError::QueryError(err.to_string()));
        }
        let parsed: GraphQlResponse = response.json().await?;
        parse_graphql_hits(query, &parsed)
    }
}
