//! Process configuration.
//!
//! Settings are layered: environment variables override the optional
//! `lens.toml` file, which overrides built-in defaults. The file is looked up
//! in the working directory unless a path is given explicitly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LensConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub tags: TagsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the Weaviate instance.
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Directory holding `visual.onnx`, `textual.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    /// `fast` (real inference) or `stub` (deterministic hashes).
    #[serde(default = "default_embed_mode")]
    pub mode: String,
    #[serde(default = "default_dim")]
    pub image_dim: usize,
    #[serde(default = "default_dim")]
    pub text_dim: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Where indexed images are copied for static serving.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker-pool size; absent means host-derived.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TagsConfig {
    /// API key for the tag-extraction model; tag extraction is disabled
    /// without one.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
}

fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_store_timeout_secs() -> u64 {
    30
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models/clip-vit-b-32")
}

fn default_embed_mode() -> String {
    "fast".to_string()
}

fn default_dim() -> usize {
    512
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_batch_size() -> usize {
    64
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            mode: default_embed_mode(),
            image_dim: default_dim(),
            text_dim: default_dim(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            batch_size: default_batch_size(),
            concurrency: None,
        }
    }
}

impl LensConfig {
    /// Loads configuration from `path` (or `lens.toml` when `None`), then
    /// applies environment overrides. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("lens.toml"));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(url) = non_empty_env("LENS_STORE_URL") {
            self.store.url = url;
        }
        if let Some(dir) = non_empty_env("LENS_MODEL_DIR") {
            self.model.dir = PathBuf::from(dir);
        }
        if let Some(mode) = non_empty_env("LENS_EMBED_MODE") {
            self.model.mode = mode;
        }
        if let Some(dir) = non_empty_env("LENS_STATIC_DIR") {
            self.index.static_dir = PathBuf::from(dir);
        }
        if let Some(key) = non_empty_env("GEMINI_API_KEY") {
            self.tags.gemini_api_key = Some(key);
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
