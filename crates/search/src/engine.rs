//! Indexing and retrieval over the image/caption collections.

use crate::document::{IndexableDocument, ResultMetadata, SearchResult};
use crate::error::Result;
use crate::schema::{
    CAPTION_COLLECTION, CAPTION_TEXT_PROP, FOR_IMAGE, IMAGE_COLLECTION, IMAGE_URL_PROP, TAGS_PROP,
};
use async_trait::async_trait;
use image::DynamicImage;
use lens_embedder::ClipEmbedder;
use lens_store::{
    NearVectorQuery, QueryHit, Reference, ReferenceJoin, VectorStore, WhereFilter,
};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Pluggable search backend: one write entry point, one read entry point.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Index one document: its image, every caption, and the links between
    /// them. Not atomic; a failure partway through leaves earlier writes in
    /// place and the caller decides whether to retry the whole document.
    async fn index(&self, document: &IndexableDocument) -> Result<()>;

    /// Text search over captions. `filter_tags` restricts hits to captions
    /// whose image carries at least one of the given tags; empty means no
    /// filtering. Returns at most `top_k` results, most similar first.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter_tags: &[String],
    ) -> Result<Vec<SearchResult>>;
}

/// The concrete backend: CLIP embeddings plus a vector store.
///
/// Holds shared handles only; cloning the `Arc`s is how the bulk indexer
/// fans this out across workers.
pub struct SearchEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<ClipEmbedder>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<ClipEmbedder>) -> Self {
        Self { store, embedder }
    }

    /// Image-to-image search against the `Image` collection. No caption is
    /// involved, so results carry no `caption` and no `caption_id`.
    pub async fn image_search(
        &self,
        query_image: &DynamicImage,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let started = Instant::now();
        let vector = self.embedder.embed_image(query_image).await?;
        let query = NearVectorQuery::new(IMAGE_COLLECTION, vector, top_k)
            .properties(&[IMAGE_URL_PROP]);
        let hits = self.store.query_near_vector(&query).await?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| SearchResult {
                image_url: hit.text_property(IMAGE_URL_PROP),
                caption: None,
                score: score_of(&hit),
                metadata: ResultMetadata {
                    caption_id: None,
                    image_id: hit.id.0,
                },
            })
            .collect();
        sort_by_score(&mut results);
        log::debug!(
            "image search returned {} hits in {}ms",
            results.len(),
            started.elapsed().as_millis()
        );
        Ok(results)
    }
}

#[async_trait]
impl SearchBackend for SearchEngine {
    async fn index(&self, document: &IndexableDocument) -> Result<()> {
        // All vectors are computed before the first write: an embedding
        // failure leaves no records behind.
        let image_vector = self.embedder.embed_image(&document.image).await?;
        let mut caption_vectors = Vec::with_capacity(document.captions.len());
        for caption in &document.captions {
            caption_vectors.push(self.embedder.embed_text(caption).await?);
        }

        let mut image_props = Map::new();
        image_props.insert(IMAGE_URL_PROP.to_string(), json!(document.image_url));
        image_props.insert(TAGS_PROP.to_string(), json!(document.tags));
        let image_id = self
            .store
            .insert(IMAGE_COLLECTION, image_props, &image_vector)
            .await?;

        let mut caption_ids = Vec::with_capacity(document.captions.len());
        for (caption, caption_vector) in document.captions.iter().zip(&caption_vectors) {
            let mut caption_props = Map::new();
            caption_props.insert(CAPTION_TEXT_PROP.to_string(), json!(caption));
            let caption_id = self
                .store
                .insert(CAPTION_COLLECTION, caption_props, caption_vector)
                .await?;
            caption_ids.push(caption_id);
        }

        // One round trip for all caption links.
        let references: Vec<Reference> = caption_ids
            .into_iter()
            .map(|caption_id| Reference {
                from_collection: CAPTION_COLLECTION.to_string(),
                from_property: FOR_IMAGE.to_string(),
                from_id: caption_id,
                to_collection: IMAGE_COLLECTION.to_string(),
                to_id: image_id.clone(),
            })
            .collect();
        if !references.is_empty() {
            self.store.add_references(&references).await?;
        }

        log::debug!(
            "indexed document {} ({} captions) as image {}",
            document.id,
            document.captions.len(),
            image_id
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter_tags: &[String],
    ) -> Result<Vec<SearchResult>> {
        let started = Instant::now();
        let vector = self.embedder.embed_text(query).await?;

        let mut near = NearVectorQuery::new(CAPTION_COLLECTION, vector, top_k)
            .properties(&[CAPTION_TEXT_PROP])
            .join(ReferenceJoin {
                on_property: FOR_IMAGE.to_string(),
                target_collection: IMAGE_COLLECTION.to_string(),
                properties: vec![IMAGE_URL_PROP.to_string()],
            });
        if !filter_tags.is_empty() {
            near = near.filter(WhereFilter::ContainsAny {
                path: vec![
                    FOR_IMAGE.to_string(),
                    IMAGE_COLLECTION.to_string(),
                    TAGS_PROP.to_string(),
                ],
                values: filter_tags.to_vec(),
            });
        }

        let hits = self.store.query_near_vector(&near).await?;
        let mut results: Vec<SearchResult> = hits.into_iter().map(caption_hit_to_result).collect();
        sort_by_score(&mut results);
        log::debug!(
            "text search '{}' returned {} hits in {}ms",
            query,
            results.len(),
            started.elapsed().as_millis()
        );
        Ok(results)
    }
}

fn caption_hit_to_result(hit: QueryHit) -> SearchResult {
    // Reference resolution can legitimately come back empty under partial
    // writes; that maps to an empty URL, not an error.
    let (image_url, image_id) = match hit.references.first() {
        Some(image) => (
            image
                .properties
                .get(IMAGE_URL_PROP)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            image.id.0.clone(),
        ),
        None => (String::new(), String::new()),
    };
    SearchResult {
        image_url,
        caption: Some(hit.text_property(CAPTION_TEXT_PROP)),
        score: score_of(&hit),
        metadata: ResultMetadata {
            caption_id: Some(hit.id.0),
            image_id,
        },
    }
}

fn score_of(hit: &QueryHit) -> f32 {
    hit.distance.unwrap_or(f32::INFINITY)
}

/// Ascending cosine distance, most similar first.
fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::schema::SchemaManager;
    use image::{Rgb, RgbImage};
    use lens_embedder::ClipConfig;
    use lens_store::{CollectionSchema, MemoryStore, RecordId};
    use pretty_assertions::assert_eq;

    const DIM: usize = 512;

    fn test_image(seed: u8) -> DynamicImage {
        let mut pixels = RgbImage::new(4, 4);
        pixels.put_pixel(0, 0, Rgb([seed, seed.wrapping_add(7), 3]));
        DynamicImage::ImageRgb8(pixels)
    }

    async fn engine_with_schema() -> (SearchEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(ClipEmbedder::new(&ClipConfig::stub()).unwrap());
        SchemaManager::new(store.clone(), DIM, DIM)
            .ensure_schema(false)
            .await
            .unwrap();
        (SearchEngine::new(store.clone(), embedder), store)
    }

    fn doc(id: &str, seed: u8, captions: &[&str], tags: &[&str]) -> IndexableDocument {
        IndexableDocument::new(
            id,
            test_image(seed),
            captions.iter().map(|c| (*c).to_string()).collect(),
            format!("static/{id}.jpg"),
        )
        .with_tags(tags.iter().map(|t| (*t).to_string()).collect())
    }

    #[tokio::test]
    async fn index_writes_image_captions_and_references() {
        let (engine, store) = engine_with_schema().await;
        engine
            .index(&doc("d1", 1, &["a dog running", "a brown dog"], &["dog"]))
            .await
            .unwrap();

        assert_eq!(store.count(IMAGE_COLLECTION), 1);
        assert_eq!(store.count(CAPTION_COLLECTION), 2);

        let results = engine.search("a dog running", 2, &[]).await.unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.image_url, "static/d1.jpg");
            assert!(!result.metadata.image_id.is_empty());
            let caption_id = RecordId(result.metadata.caption_id.clone().unwrap());
            let refs = store.references_of(CAPTION_COLLECTION, &caption_id, FOR_IMAGE);
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].0, result.metadata.image_id);
        }
    }

    /// Delegates to a [`MemoryStore`] but releases the embedding model on
    /// every insert, so any embedding attempted after the first write fails.
    struct ClosingStore {
        inner: Arc<MemoryStore>,
        embedder: Arc<ClipEmbedder>,
    }

    #[async_trait]
    impl VectorStore for ClosingStore {
        async fn collection_exists(&self, name: &str) -> lens_store::Result<bool> {
            self.inner.collection_exists(name).await
        }

        async fn create_collection(&self, schema: &CollectionSchema) -> lens_store::Result<()> {
            self.inner.create_collection(schema).await
        }

        async fn delete_collection(&self, name: &str) -> lens_store::Result<()> {
            self.inner.delete_collection(name).await
        }

        async fn insert(
            &self,
            collection: &str,
            properties: Map<String, Value>,
            vector: &[f32],
        ) -> lens_store::Result<RecordId> {
            self.embedder.close();
            self.inner.insert(collection, properties, vector).await
        }

        async fn add_references(&self, references: &[Reference]) -> lens_store::Result<()> {
            self.inner.add_references(references).await
        }

        async fn query_near_vector(
            &self,
            query: &NearVectorQuery,
        ) -> lens_store::Result<Vec<QueryHit>> {
            self.inner.query_near_vector(query).await
        }
    }

    #[tokio::test]
    async fn embedding_failure_leaves_no_records() {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(ClipEmbedder::new(&ClipConfig::stub()).unwrap());
        SchemaManager::new(store.clone(), DIM, DIM)
            .ensure_schema(false)
            .await
            .unwrap();
        let engine = SearchEngine::new(store.clone(), embedder.clone());

        embedder.close();
        let err = engine
            .index(&doc("d1", 1, &["a dog running"], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::EmbedderError(_)));
        assert_eq!(store.count(IMAGE_COLLECTION), 0);
        assert_eq!(store.count(CAPTION_COLLECTION), 0);
    }

    #[tokio::test]
    async fn all_vectors_are_computed_before_the_first_write() {
        let inner = Arc::new(MemoryStore::new());
        let embedder = Arc::new(ClipEmbedder::new(&ClipConfig::stub()).unwrap());
        SchemaManager::new(inner.clone(), DIM, DIM)
            .ensure_schema(false)
            .await
            .unwrap();
        let store = Arc::new(ClosingStore {
            inner: inner.clone(),
            embedder: embedder.clone(),
        });
        let engine = SearchEngine::new(store, embedder);

        // The first insert closes the embedder; indexing still completes
        // because no caption is embedded after a write.
        engine
            .index(&doc("d1", 1, &["a dog running", "a brown dog"], &[]))
            .await
            .unwrap();
        assert_eq!(inner.count(IMAGE_COLLECTION), 1);
        assert_eq!(inner.count(CAPTION_COLLECTION), 2);
    }

    #[tokio::test]
    async fn search_honors_top_k_and_orders_most_similar_first() {
        let (engine, _store) = engine_with_schema().await;
        for (i, caption) in ["a red car", "a blue boat", "a green tree"]
            .into_iter()
            .enumerate()
        {
            engine
                .index(&doc(&format!("d{i}"), i as u8, &[caption], &[]))
                .await
                .unwrap();
        }

        let results = engine.search("a red car", 2, &[]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score <= results[1].score);
        assert_eq!(results[0].caption.as_deref(), Some("a red car"));
        assert!(results[0].score.abs() < 1e-5);
    }

    #[tokio::test]
    async fn repeated_queries_return_identical_orderings() {
        let (engine, _store) = engine_with_schema().await;
        for i in 0..5 {
            engine
                .index(&doc(&format!("d{i}"), i, &[&format!("caption number {i}")], &[]))
                .await
                .unwrap();
        }
        let first: Vec<_> = engine
            .search("caption", 5, &[])
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.metadata.caption_id)
            .collect();
        let second: Vec<_> = engine
            .search("caption", 5, &[])
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.metadata.caption_id)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn tag_filter_restricts_to_matching_images() {
        let (engine, _store) = engine_with_schema().await;
        engine
            .index(&doc("dog", 1, &["an animal outside"], &["dog", "outdoor"]))
            .await
            .unwrap();
        engine
            .index(&doc("cat", 2, &["an animal inside"], &["cat", "indoor"]))
            .await
            .unwrap();

        let filtered = engine
            .search("animal", 10, &["dog".to_string()])
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].image_url, "static/dog.jpg");

        let unfiltered = engine.search("animal", 10, &[]).await.unwrap();
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn dog_in_a_field_scenario() {
        let (engine, store) = engine_with_schema().await;
        engine
            .index(&doc(
                "dog",
                9,
                &["a dog running", "a brown dog in a field"],
                &["dog", "outdoor"],
            ))
            .await
            .unwrap();

        let results = engine
            .search("dog in a field", 1, &["dog".to_string()])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let caption = results[0].caption.as_deref().unwrap();
        assert!(caption == "a dog running" || caption == "a brown dog in a field");
        assert_eq!(store.count(IMAGE_COLLECTION), 1);
        let caption_id = RecordId(results[0].metadata.caption_id.clone().unwrap());
        let refs = store.references_of(CAPTION_COLLECTION, &caption_id, FOR_IMAGE);
        assert_eq!(refs[0].0, results[0].metadata.image_id);
    }

    #[tokio::test]
    async fn image_search_returns_identical_image_as_top_hit() {
        let (engine, _store) = engine_with_schema().await;
        engine.index(&doc("a", 10, &["first"], &[])).await.unwrap();
        engine.index(&doc("b", 20, &["second"], &[])).await.unwrap();

        let results = engine.image_search(&test_image(10), 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].image_url, "static/a.jpg");
        assert!(results[0].score.abs() < 1e-5);
        assert_eq!(results[0].caption, None);
        assert_eq!(results[0].metadata.caption_id, None);
    }

    #[tokio::test]
    async fn image_search_on_empty_index_returns_no_results() {
        let (engine, _store) = engine_with_schema().await;
        let results = engine.image_search(&test_image(1), 5).await.unwrap();
        assert!(results.is_empty());
    }
}
