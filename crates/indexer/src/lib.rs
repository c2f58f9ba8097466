//! # Lens Indexer
//!
//! Bulk indexing of image datasets. [`load_manifest`] turns a JSONL manifest
//! into raw records, and [`BulkIndexer`] pushes them through a
//! [`lens_search::SearchBackend`] in concurrent batches with per-document
//! failure isolation.

mod dataset;
mod driver;
mod error;
mod limits;
mod stats;

pub use dataset::{load_manifest, Dataset, RawDocument};
pub use driver::BulkIndexer;
pub use error::{IndexerError, Result};
pub use limits::bulk_concurrency;
pub use stats::IndexStats;
