//! Collection layout for the image/caption pair.

use crate::error::Result;
use lens_store::{CollectionSchema, Distance, PropertySpec, Tokenization, VectorStore};
use std::sync::Arc;

pub const IMAGE_COLLECTION: &str = "Image";
pub const CAPTION_COLLECTION: &str = "Caption";
/// Reference property on `Caption` pointing back at its `Image`.
pub const FOR_IMAGE: &str = "forImage";

pub const IMAGE_URL_PROP: &str = "imageUrl";
pub const TAGS_PROP: &str = "tags";
pub const CAPTION_TEXT_PROP: &str = "captionText";

pub fn image_schema(dimension: usize) -> CollectionSchema {
    CollectionSchema::new(IMAGE_COLLECTION, Distance::Cosine, dimension)
        .description("Indexed images with their visual embedding")
        .property(PropertySpec::text(IMAGE_URL_PROP).filterable())
        .property(PropertySpec::text_array(TAGS_PROP).filterable())
}

pub fn caption_schema(dimension: usize) -> CollectionSchema {
    CollectionSchema::new(CAPTION_COLLECTION, Distance::Cosine, dimension)
        .description("Captions with their text embedding, linked to an image")
        .property(
            PropertySpec::text(CAPTION_TEXT_PROP)
                .filterable()
                .searchable(Tokenization::Word),
        )
        .reference(FOR_IMAGE, IMAGE_COLLECTION)
}

/// Provisions the two collections on startup.
///
/// Both collections are created together or not at all checked; a provisioning
/// failure is fatal to the caller since nothing can be indexed or queried
/// without the schema.
pub struct SchemaManager {
    store: Arc<dyn VectorStore>,
    image_dimension: usize,
    text_dimension: usize,
}

impl SchemaManager {
    pub fn new(store: Arc<dyn VectorStore>, image_dimension: usize, text_dimension: usize) -> Self {
        Self {
            store,
            image_dimension,
            text_dimension,
        }
    }

    /// Creates the `Image` and `Caption` collections if they do not exist.
    ///
    /// With `force_recreate`, existing collections are dropped first, which
    /// discards all indexed data. Existing collections are otherwise left
    /// untouched, so repeated startups are cheap no-ops.
    pub async fn ensure_schema(&self, force_recreate: bool) -> Result<()> {
        if force_recreate {
            log::warn!("force-recreating collections, all indexed data will be lost");
            self.delete_collections().await?;
        }

        // Image first: Caption declares a reference to it.
        if !self.store.collection_exists(IMAGE_COLLECTION).await? {
            self.store
                .create_collection(&image_schema(self.image_dimension))
                .await?;
            log::info!("created collection {IMAGE_COLLECTION}");
        }
        if !self.store.collection_exists(CAPTION_COLLECTION).await? {
            self.store
                .create_collection(&caption_schema(self.text_dimension))
                .await?;
            log::info!("created collection {CAPTION_COLLECTION}");
        }
        Ok(())
    }

    /// Drops both collections. Absent collections are ignored.
    pub async fn delete_collections(&self) -> Result<()> {
        // Caption first, so the store never sees a dangling reference target.
        self.store.delete_collection(CAPTION_COLLECTION).await?;
        self.store.delete_collection(IMAGE_COLLECTION).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let manager = SchemaManager::new(store.clone(), 512, 512);
        manager.ensure_schema(false).await.unwrap();
        manager.ensure_schema(false).await.unwrap();
        assert!(store.collection_exists(IMAGE_COLLECTION).await.unwrap());
        assert!(store.collection_exists(CAPTION_COLLECTION).await.unwrap());
    }

    #[tokio::test]
    async fn force_recreate_discards_existing_records() {
        let store = Arc::new(MemoryStore::new());
        let manager = SchemaManager::new(store.clone(), 4, 4);
        manager.ensure_schema(false).await.unwrap();
        store
            .insert(
                IMAGE_COLLECTION,
                serde_json::Map::new(),
                &[1.0, 0.0, 0.0, 0.0],
            )
            .await
            .unwrap();
        assert_eq!(store.count(IMAGE_COLLECTION), 1);

        manager.ensure_schema(true).await.unwrap();
        assert_eq!(store.count(IMAGE_COLLECTION), 0);
    }

    #[test]
    fn caption_schema_links_to_image() {
        let schema = caption_schema(512);
        assert_eq!(schema.references.len(), 1);
        assert_eq!(schema.references[0].name, FOR_IMAGE);
        assert_eq!(schema.references[0].target, IMAGE_COLLECTION);
    }
}
