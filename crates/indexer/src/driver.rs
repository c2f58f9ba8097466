//! Batched, bounded-concurrency bulk indexing.

use crate::dataset::{Dataset, RawDocument};
use crate::error::{IndexerError, Result};
use crate::limits::bulk_concurrency;
use crate::stats::IndexStats;
use lens_search::{IndexableDocument, SearchBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Drives a dataset through a [`SearchBackend`].
///
/// The dataset is partitioned into contiguous batches; batches run
/// concurrently on a semaphore-bounded pool while documents within one batch
/// run sequentially. A document failure is logged and counted, never fatal
/// to its batch or the run.
pub struct BulkIndexer {
    backend: Arc<dyn SearchBackend>,
    /// Directory images are copied into for static serving.
    static_dir: PathBuf,
    concurrency: usize,
}

impl BulkIndexer {
    pub fn new(backend: Arc<dyn SearchBackend>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            static_dir: static_dir.into(),
            concurrency: bulk_concurrency(None),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = bulk_concurrency(Some(concurrency));
        self
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Indexes the dataset in batches of `batch_size`. With `limit`, only the
    /// first `limit` documents are processed, which keeps smoke runs cheap.
    ///
    /// Returns only after every dispatched batch has finished. The returned
    /// stats count malformed manifest lines as failures alongside per-document
    /// indexing errors.
    pub async fn index_dataset(
        &self,
        dataset: Dataset,
        batch_size: usize,
        limit: Option<usize>,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let mut stats = IndexStats::new();
        for reason in dataset.malformed {
            stats.add_error(reason);
        }

        let mut documents = dataset.documents;
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        tokio::fs::create_dir_all(&self.static_dir).await?;

        let batch_size = batch_size.max(1);
        let batches: Vec<Vec<RawDocument>> = documents
            .chunks(batch_size)
            .map(<[RawDocument]>::to_vec)
            .collect();
        log::info!(
            "bulk indexing {} documents in {} batches ({} workers)",
            batches.iter().map(Vec::len).sum::<usize>(),
            batches.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<IndexStats> = JoinSet::new();
        for (batch_index, batch) in batches.into_iter().enumerate() {
            let backend = self.backend.clone();
            let static_dir = self.static_dir.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // The semaphore is never closed; acquire failures are not expected.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("bulk concurrency semaphore closed"));
                run_batch(batch_index, batch, backend, static_dir).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(batch_stats) => stats.merge(batch_stats),
                Err(e) => stats.add_error(format!("batch task panicked: {e}")),
            }
        }

        stats.time_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "bulk indexing finished: {} indexed, {} failed in {}ms",
            stats.documents,
            stats.failed,
            stats.time_ms
        );
        Ok(stats)
    }
}

async fn run_batch(
    batch_index: usize,
    batch: Vec<RawDocument>,
    backend: Arc<dyn SearchBackend>,
    static_dir: PathBuf,
) -> IndexStats {
    let mut stats = IndexStats::new();
    stats.batches = 1;
    for document in batch {
        let id = document.id.clone();
        match index_one(document, backend.as_ref(), &static_dir).await {
            Ok(captions) => stats.add_document(captions),
            Err(e) => {
                log::warn!("batch {batch_index}: document '{id}' failed: {e}");
                stats.add_error(format!("{id}: {e}"));
            }
        }
    }
    stats
}

/// Resolves one raw record to durable storage and indexes it. Each step's
/// failure fails only this document.
async fn index_one(
    raw: RawDocument,
    backend: &dyn SearchBackend,
    static_dir: &std::path::Path,
) -> Result<usize> {
    let bytes = tokio::fs::read(&raw.image_path).await?;
    let image = image::load_from_memory(&bytes).map_err(|source| IndexerError::UndecodableImage {
        id: raw.id.clone(),
        source,
    })?;

    tokio::fs::write(static_dir.join(&raw.filename), &bytes).await?;
    let image_url = format!("static/{}", raw.filename);

    let caption_count = raw.captions.len();
    let document = IndexableDocument::new(raw.id, image, raw.captions, image_url)
        .with_tags(raw.tags);
    backend.index(&document).await?;
    Ok(caption_count)
}
