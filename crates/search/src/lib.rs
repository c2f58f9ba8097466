//! # Lens Search
//!
//! The indexing and retrieval core. A [`SearchEngine`] wires a
//! [`lens_embedder::ClipEmbedder`] to a [`lens_store::VectorStore`]: indexing
//! writes one `Image` record plus one `Caption` record per caption and links
//! them, text search runs nearest-neighbor over captions with an optional tag
//! filter and resolves each caption back to its image, and image search runs
//! directly over the image collection.

mod document;
mod engine;
mod error;
mod schema;

pub use document::{IndexableDocument, ResultMetadata, SearchResult};
pub use engine::{SearchBackend, SearchEngine};
pub use error::{Result, SearchError};
pub use schema::{
    caption_schema, image_schema, SchemaManager, CAPTION_COLLECTION, CAPTION_TEXT_PROP, FOR_IMAGE,
    IMAGE_COLLECTION, IMAGE_URL_PROP, TAGS_PROP,
};
