//! End-to-end bulk flow: manifest on disk, stub embeddings, in-memory store.

use lens_embedder::{ClipConfig, ClipEmbedder};
use lens_indexer::{load_manifest, BulkIndexer};
use lens_search::{SchemaManager, SearchBackend, SearchEngine, CAPTION_COLLECTION, IMAGE_COLLECTION};
use lens_store::MemoryStore;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 512;

fn png_bytes(seed: u8) -> Vec<u8> {
    let mut pixels = image::RgbImage::new(4, 4);
    pixels.put_pixel(0, 0, image::Rgb([seed, 0, 0]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
}

async fn engine_with_schema() -> (Arc<SearchEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(ClipEmbedder::new(&ClipConfig::stub()).expect("stub embedder"));
    SchemaManager::new(store.clone(), DIM, DIM)
        .ensure_schema(false)
        .await
        .expect("schema");
    (Arc::new(SearchEngine::new(store.clone(), embedder)), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manifest_to_searchable_index() {
    let temp = TempDir::new().expect("tempdir");
    std::fs::write(temp.path().join("dog.png"), png_bytes(1)).expect("write dog");
    std::fs::write(temp.path().join("cat.png"), png_bytes(2)).expect("write cat");

    let manifest_path = temp.path().join("manifest.jsonl");
    let mut manifest = std::fs::File::create(&manifest_path).expect("manifest");
    writeln!(
        manifest,
        r#"{{"id": "dog", "file": "dog.png", "captions": ["a dog running", "a brown dog"], "tags": ["dog"]}}"#
    )
    .expect("line");
    writeln!(
        manifest,
        r#"{{"id": "cat", "file": "cat.png", "captions": ["a cat sleeping"], "tags": ["cat"]}}"#
    )
    .expect("line");

    let (engine, store) = engine_with_schema().await;
    let dataset = load_manifest(&manifest_path).expect("load manifest");
    let indexer = BulkIndexer::new(engine.clone(), temp.path().join("static")).with_concurrency(2);
    let stats = indexer.index_dataset(dataset, 1, None).await.expect("index");

    assert_eq!(stats.documents, 2);
    assert_eq!(stats.captions, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.batches, 2);
    assert_eq!(store.count(IMAGE_COLLECTION), 2);
    assert_eq!(store.count(CAPTION_COLLECTION), 3);
    assert!(temp.path().join("static/dog.png").exists());

    // Text search resolves the caption back to its stored image URL.
    let hits = engine
        .search("a dog running", 1, &["dog".to_string()])
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].image_url, "static/dog.png");
    assert_eq!(hits[0].caption.as_deref(), Some("a dog running"));

    // Image search with the identical image puts it first.
    let query = image::load_from_memory(&png_bytes(2)).expect("decode");
    let hits = engine.image_search(&query, 2).await.expect("image search");
    assert_eq!(hits[0].image_url, "static/cat.png");
}
