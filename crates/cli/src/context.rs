//! Process-wide dependency wiring.
//!
//! Everything the commands need is built once here and passed down
//! explicitly; nothing lives in globals. Shutdown is ordered: the embedding
//! model is released first, then the store connection drops with the context.

use crate::config::LensConfig;
use anyhow::{Context, Result};
use lens_embedder::{ClipConfig, ClipEmbedder, EmbeddingMode};
use lens_search::{SchemaManager, SearchEngine};
use lens_store::{VectorStore, WeaviateConfig, WeaviateStore};
use std::sync::Arc;
use std::time::Duration;

pub struct AppContext {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<ClipEmbedder>,
    pub engine: Arc<SearchEngine>,
    image_dim: usize,
    text_dim: usize,
}

impl AppContext {
    pub fn initialize(config: &LensConfig) -> Result<Self> {
        let mode = EmbeddingMode::parse(&config.model.mode)
            .context("invalid [model] mode in configuration")?;
        let clip_config = ClipConfig {
            mode,
            image_dim: config.model.image_dim,
            text_dim: config.model.text_dim,
            ..ClipConfig::new(&config.model.dir)
        };
        let embedder = Arc::new(
            ClipEmbedder::new(&clip_config).context("failed to load the embedding model")?,
        );

        let mut store_config = WeaviateConfig::new(&config.store.url);
        store_config.timeout = Duration::from_secs(config.store.timeout_secs);
        let store: Arc<dyn VectorStore> = Arc::new(
            WeaviateStore::new(store_config).context("failed to create the store client")?,
        );

        let engine = Arc::new(SearchEngine::new(store.clone(), embedder.clone()));
        Ok(Self {
            store,
            embedder,
            engine,
            image_dim: config.model.image_dim,
            text_dim: config.model.text_dim,
        })
    }

    pub fn schema_manager(&self) -> SchemaManager {
        SchemaManager::new(self.store.clone(), self.image_dim, self.text_dim)
    }

    /// Releases resources in order: model first, then the store handle goes
    /// down with `self`.
    pub fn shutdown(self) {
        self.embedder.close();
    }
}
