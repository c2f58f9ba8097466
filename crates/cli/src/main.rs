use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lens_indexer::{load_manifest, BulkIndexer};
use lens_search::SearchBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LensConfig;
use crate::context::AppContext;
use crate::tags::{GeminiTagExtractor, NoopTagExtractor, TagExtractor};

mod config;
mod context;
mod tags;

#[derive(Parser)]
#[command(name = "lens")]
#[command(about = "Multi-modal semantic image search", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to ./lens.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the Image and Caption collections
    Schema {
        /// Drop and recreate the collections, discarding all indexed data
        #[arg(long)]
        force: bool,
    },

    /// Bulk-index a dataset from a JSONL manifest
    Index {
        /// Path to the manifest; image paths are resolved relative to it
        #[arg(long)]
        dataset: PathBuf,

        /// Index only the first N records (smoke runs)
        #[arg(long)]
        count: Option<usize>,

        /// Documents per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Worker-pool size (default is host-derived)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Search captions by text query
    Search {
        query: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Restrict to images carrying at least one of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Extract filter tags from the query with the configured model
        #[arg(long)]
        auto_tags: bool,
    },

    /// Search images by example image
    ImageSearch {
        /// Path to the query image
        path: PathBuf,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // Always silence ort unless verbose mode (ORT is extremely noisy)
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = LensConfig::load(cli.config.as_deref())?;
    let ctx = AppContext::initialize(&config)?;

    let outcome = match cli.command {
        Commands::Schema { force } => run_schema(&ctx, force).await,
        Commands::Index {
            dataset,
            count,
            batch_size,
            concurrency,
        } => run_index(&ctx, &config, &dataset, count, batch_size, concurrency).await,
        Commands::Search {
            query,
            top_k,
            tags,
            auto_tags,
        } => run_search(&ctx, &config, &query, top_k, tags, auto_tags).await,
        Commands::ImageSearch { path, top_k } => run_image_search(&ctx, &path, top_k).await,
    };

    ctx.shutdown();
    outcome
}

async fn run_schema(ctx: &AppContext, force: bool) -> Result<()> {
    ctx.schema_manager()
        .ensure_schema(force)
        .await
        .context("schema provisioning failed")?;
    log::info!("collections ready");
    Ok(())
}

async fn run_index(
    ctx: &AppContext,
    config: &LensConfig,
    dataset_path: &std::path::Path,
    count: Option<usize>,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
) -> Result<()> {
    let dataset = load_manifest(dataset_path)?;
    let backend: Arc<dyn SearchBackend> = ctx.engine.clone();
    let mut indexer = BulkIndexer::new(backend, &config.index.static_dir);
    if let Some(concurrency) = concurrency.or(config.index.concurrency) {
        indexer = indexer.with_concurrency(concurrency);
    }
    let batch_size = batch_size.unwrap_or(config.index.batch_size);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("indexing {}", dataset_path.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let stats = indexer.index_dataset(dataset, batch_size, count).await?;
    spinner.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&stats)?);
    if stats.failed > 0 {
        log::warn!("{} documents failed, see errors above", stats.failed);
    }
    Ok(())
}

async fn run_search(
    ctx: &AppContext,
    config: &LensConfig,
    query: &str,
    top_k: usize,
    mut tags: Vec<String>,
    auto_tags: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if top_k == 0 {
        bail!("--top-k must be at least 1");
    }

    if auto_tags {
        let extractor: Box<dyn TagExtractor> = match &config.tags.gemini_api_key {
            Some(key) => Box::new(GeminiTagExtractor::new(key, &config.tags.gemini_model)),
            None => {
                log::warn!("--auto-tags requested but no API key configured");
                Box::new(NoopTagExtractor)
            }
        };
        tags.extend(extractor.extract_tags(query).await);
    }
    tags.sort();
    tags.dedup();

    let results = ctx.engine.search(query, top_k, &tags).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn run_image_search(ctx: &AppContext, path: &std::path::Path, top_k: usize) -> Result<()> {
    if top_k == 0 {
        bail!("--top-k must be at least 1");
    }
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let results = ctx.engine.image_search(&image, top_k).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
