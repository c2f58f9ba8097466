//! Query and write types shared by all store implementations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store-assigned identifier of a persisted record. Opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed link from one record to another, stored under a reference
/// property of the source collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Collection the link originates from.
    pub from_collection: String,
    /// Reference property on the source collection (e.g. `forImage`).
    pub from_property: String,
    pub from_id: RecordId,
    /// Collection the link points into.
    pub to_collection: String,
    pub to_id: RecordId,
}

/// Structured filter applied server-side during a near-vector query.
///
/// `path` addresses a property either directly (`["tags"]`) or across a
/// reference property (`["forImage", "Image", "tags"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhereFilter {
    /// Matches records whose text-array property intersects `values`.
    ContainsAny { path: Vec<String>, values: Vec<String> },
}

/// Request to resolve a reference property alongside each hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceJoin {
    /// Reference property on the queried collection.
    pub on_property: String,
    /// Collection the reference points into.
    pub target_collection: String,
    /// Properties to return from the joined records.
    pub properties: Vec<String>,
}

/// A nearest-neighbor query against one collection.
#[derive(Debug, Clone)]
pub struct NearVectorQuery {
    pub collection: String,
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Scalar properties to return for each hit.
    pub properties: Vec<String>,
    pub filter: Option<WhereFilter>,
    pub join: Option<ReferenceJoin>,
}

impl NearVectorQuery {
    pub fn new(collection: impl Into<String>, vector: Vec<f32>, limit: usize) -> Self {
        Self {
            collection: collection.into(),
            vector,
            limit,
            properties: Vec::new(),
            filter: None,
            join: None,
        }
    }

    pub fn properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(|p| (*p).to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: WhereFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn join(mut self, join: ReferenceJoin) -> Self {
        self.join = Some(join);
        self
    }
}

/// A record resolved through a [`ReferenceJoin`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    pub id: RecordId,
    pub properties: Map<String, Value>,
}

/// One hit returned by [`crate::VectorStore::query_near_vector`], in store
/// order (nearest first).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: RecordId,
    pub properties: Map<String, Value>,
    /// Distance under the collection's metric. Present whenever the store
    /// reports it; for cosine distance 0.0 means identical.
    pub distance: Option<f32>,
    /// Joined records for the requested reference property, possibly empty
    /// when the reference was never written (partial indexing).
    pub references: Vec<ResolvedReference>,
}

impl QueryHit {
    /// Convenience accessor for a text property, empty string when absent.
    pub fn text_property(&self, name: &str) -> String {
        self.properties
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}
