use crate::error::Result;
use crate::schema::CollectionSchema;
use crate::types::{NearVectorQuery, QueryHit, RecordId, Reference};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Client contract for an external vector database.
///
/// The store is the sole source of truth for write ordering and id
/// uniqueness. Implementations must be safe to share across tasks; every
/// method is a potential suspension point (network I/O).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection from a declarative schema. Fails if the
    /// collection already exists; callers check [`Self::collection_exists`]
    /// first for idempotent provisioning.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Delete a collection and all of its records. Deleting an absent
    /// collection is a no-op.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert one record with externally computed vector. Returns the
    /// store-assigned id.
    async fn insert(
        &self,
        collection: &str,
        properties: Map<String, Value>,
        vector: &[f32],
    ) -> Result<RecordId>;

    /// Create many references in a single batched call.
    async fn add_references(&self, references: &[Reference]) -> Result<()>;

    /// Nearest-neighbor query. Hits come back nearest-first in the store's
    /// distance order, at most `limit` of them.
    async fn query_near_vector(&self, query: &NearVectorQuery) -> Result<Vec<QueryHit>>;
}
