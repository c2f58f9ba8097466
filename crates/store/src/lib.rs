//! # Lens Store
//!
//! Client contract for the external vector database plus its two
//! implementations:
//!
//! - [`WeaviateStore`] talks to a running Weaviate instance over REST and
//!   GraphQL.
//! - [`MemoryStore`] is a brute-force in-memory store for tests and offline
//!   smoke runs.
//!
//! Records carry structured properties and one externally computed vector;
//! collections may link to each other through reference properties that are
//! resolved at query time.

mod error;
mod memory;
mod schema;
mod store;
mod types;
mod weaviate;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use schema::{
    CollectionSchema, DataType, Distance, PropertySpec, ReferenceSpec, Tokenization,
};
pub use store::VectorStore;
pub use types::{
    NearVectorQuery, QueryHit, RecordId, Reference, ReferenceJoin, ResolvedReference, WhereFilter,
};
pub use weaviate::{WeaviateConfig, WeaviateStore};
