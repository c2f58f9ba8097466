use crate::error::{EmbedderError, Result};
use crate::preprocess::preprocess;
use image::DynamicImage;
use ndarray::{Array, Array4, Ix2};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

/// Default output dimension of the CLIP ViT-B/32 checkpoint, both towers.
const DEFAULT_DIM: usize = 512;
const DEFAULT_IMAGE_SIZE: u32 = 224;
const DEFAULT_CONTEXT_LENGTH: usize = 77;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Real ONNX inference.
    Fast,
    /// Deterministic hash-seeded vectors, for tests and smoke runs.
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(EmbedderError::Other(format!(
                "Unsupported embedding mode '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }
}

/// Construction-time settings for [`ClipEmbedder`].
///
/// The model directory is expected to hold `visual.onnx`, `textual.onnx`,
/// and `tokenizer.json`.
#[derive(Debug, Clone)]
pub struct ClipConfig {
    pub model_dir: PathBuf,
    pub mode: EmbeddingMode,
    /// Image-tower output dimension (`D_img`).
    pub image_dim: usize,
    /// Text-tower output dimension (`D_txt`). Independent of `image_dim`;
    /// the default checkpoint happens to make them equal.
    pub text_dim: usize,
    pub image_size: u32,
    pub context_length: usize,
}

impl ClipConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            mode: EmbeddingMode::Fast,
            image_dim: DEFAULT_DIM,
            text_dim: DEFAULT_DIM,
            image_size: DEFAULT_IMAGE_SIZE,
            context_length: DEFAULT_CONTEXT_LENGTH,
        }
    }

    pub fn stub() -> Self {
        Self {
            mode: EmbeddingMode::Stub,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn mode(mut self, mode: EmbeddingMode) -> Self {
        self.mode = mode;
        self
    }
}

struct OrtBackend {
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
    image_dim: usize,
    text_dim: usize,
    context_length: usize,
}

impl OrtBackend {
    fn load(config: &ClipConfig) -> Result<Self> {
        let vision_path = config.model_dir.join("visual.onnx");
        let text_path = config.model_dir.join("textual.onnx");
        let tokenizer_path = config.model_dir.join("tokenizer.json");
        for path in [&vision_path, &text_path, &tokenizer_path] {
            if !path.exists() {
                return Err(EmbedderError::ModelError(format!(
                    "Model file missing: {}. Place the exported CLIP assets under {}.",
                    path.display(),
                    config.model_dir.display()
                )));
            }
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::TokenizerError(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(config.context_length),
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.context_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                EmbedderError::TokenizerError(format!("Tokenizer truncation failed: {e}"))
            })?;

        let vision = build_session(&vision_path)?;
        let text = build_session(&text_path)?;

        log::info!(
            "Loaded CLIP towers from {} (image dim {}, text dim {})",
            config.model_dir.display(),
            config.image_dim,
            config.text_dim
        );

        Ok(Self {
            vision: Mutex::new(vision),
            text: Mutex::new(text),
            tokenizer,
            image_dim: config.image_dim,
            text_dim: config.text_dim,
            context_length: config.context_length,
        })
    }

    fn embed_image_blocking(&self, pixels: Array4<f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(pixels.into_dyn())
            .map_err(|e| EmbedderError::ModelError(format!("{e}")))?
            .upcast();

        let mut session = self
            .vision
            .lock()
            .map_err(|_| EmbedderError::ModelError("Failed to lock vision session".into()))?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| EmbedderError::ModelError("Vision model has no inputs".into()))?;

        let mut feed: HashMap<String, DynTensor> = HashMap::new();
        feed.insert(input_name, tensor);
        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| EmbedderError::ModelError(format!("Vision forward failed: {e}")))?;
        let array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EmbedderError::ModelError(format!("Failed to decode vision output: {e}")))?
            .to_owned();
        drop(outputs);
        drop(session);

        first_row(array, self.image_dim)
    }

    fn embed_text_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::TokenizerError(format!("Tokenization failed: {e}")))?;

        let seq_len = self.context_length;
        let mut ids = Vec::with_capacity(seq_len);
        let mut mask = Vec::with_capacity(seq_len);
        for idx in 0..seq_len {
            ids.push(i64::from(*encoding.get_ids().get(idx).unwrap_or(&0)));
            mask.push(i64::from(
                *encoding.get_attention_mask().get(idx).unwrap_or(&0),
            ));
        }
        let ids_array = Array::from_shape_vec((1, seq_len), ids)
            .map_err(|e| EmbedderError::ModelError(format!("IDs shape error: {e}")))?;
        let mask_array = Array::from_shape_vec((1, seq_len), mask)
            .map_err(|e| EmbedderError::ModelError(format!("Mask shape error: {e}")))?;

        let mut available: HashMap<String, DynTensor> = HashMap::new();
        available.insert(
            "input_ids".to_string(),
            Tensor::from_array(ids_array.into_dyn())
                .map_err(|e| EmbedderError::ModelError(format!("{e}")))?
                .upcast(),
        );
        available.insert(
            "attention_mask".to_string(),
            Tensor::from_array(mask_array.into_dyn())
                .map_err(|e| EmbedderError::ModelError(format!("{e}")))?
                .upcast(),
        );

        let mut session = self
            .text
            .lock()
            .map_err(|_| EmbedderError::ModelError("Failed to lock text session".into()))?;
        let expected: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let mut feed: HashMap<String, DynTensor> = HashMap::new();
        for key in expected {
            match available.remove(&key) {
                Some(value) => {
                    feed.insert(key, value);
                }
                None => {
                    return Err(EmbedderError::ModelError(format!(
                        "Unsupported text model input '{key}'"
                    )));
                }
            }
        }
        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| EmbedderError::ModelError(format!("Text forward failed: {e}")))?;
        let array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EmbedderError::ModelError(format!("Failed to decode text output: {e}")))?
            .to_owned();
        drop(outputs);
        drop(session);

        first_row(array, self.text_dim)
    }
}

fn build_session(path: &Path) -> Result<Session> {
    let (intra_threads, inter_threads) = default_ort_threads();
    let providers = build_execution_providers();
    Session::builder()
        .map_err(|e| EmbedderError::ModelError(format!("{e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to set ORT intra threads: {e}")))?
        .with_inter_threads(inter_threads)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to set ORT inter threads: {e}")))?
        .with_intra_op_spinning(false)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to disable intra spinning: {e}")))?
        .with_inter_op_spinning(false)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to disable inter spinning: {e}")))?
        .with_execution_providers(providers)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to register providers: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to set optimization level: {e}")))?
        .commit_from_file(path)
        .map_err(|e| EmbedderError::ModelError(format!("Failed to load ONNX model: {e}")))
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    // Keep inference polite: bulk indexing fans out across documents, so per-session
    // parallelism stays conservative.
    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };
    (intra_threads, 1)
}

fn is_cuda_disabled() -> bool {
    env::var("ORT_DISABLE_CUDA")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn build_execution_providers() -> Vec<ExecutionProviderDispatch> {
    if !is_cuda_disabled() {
        let cuda = CUDAExecutionProvider::default();
        if matches!(cuda.is_available(), Ok(true)) {
            return vec![cuda.build(), CPUExecutionProvider::default().build()];
        }
        log::warn!("CUDA execution provider unavailable, embedding on CPU");
    }
    vec![CPUExecutionProvider::default().build()]
}

fn first_row(array: ndarray::ArrayD<f32>, expected_dim: usize) -> Result<Vec<f32>> {
    let matrix = array
        .into_dimensionality::<Ix2>()
        .map_err(|e| EmbedderError::ModelError(format!("Bad output shape: {e}")))?;
    let row = matrix
        .outer_iter()
        .next()
        .ok_or_else(|| EmbedderError::ModelError("Empty embedding output".into()))?;
    let mut embedding = row.to_owned().to_vec();
    if embedding.len() != expected_dim {
        return Err(EmbedderError::InvalidDimension {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }
    normalize(&mut embedding);
    Ok(embedding)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn stub_embed(bytes: &[u8], dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(bytes) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum Backend {
    Ort(Arc<OrtBackend>),
    Stub { image_dim: usize, text_dim: usize },
    Closed,
}

/// Vision-language embedding provider.
///
/// Owns the loaded CLIP towers and tokenizer. Concurrent `embed_*` calls are
/// allowed; access to each ONNX session is serialized behind its own mutex.
/// [`ClipEmbedder::close`] releases the sessions (and any device memory)
/// explicitly; embedding after close is an error.
pub struct ClipEmbedder {
    backend: RwLock<Backend>,
    image_dim: usize,
    text_dim: usize,
    image_size: u32,
}

impl ClipEmbedder {
    pub fn new(config: &ClipConfig) -> Result<Self> {
        let backend = match config.mode {
            EmbeddingMode::Stub => Backend::Stub {
                image_dim: config.image_dim,
                text_dim: config.text_dim,
            },
            EmbeddingMode::Fast => Backend::Ort(Arc::new(OrtBackend::load(config)?)),
        };
        Ok(Self {
            backend: RwLock::new(backend),
            image_dim: config.image_dim,
            text_dim: config.text_dim,
            image_size: config.image_size,
        })
    }

    #[must_use]
    pub const fn image_dimension(&self) -> usize {
        self.image_dim
    }

    #[must_use]
    pub const fn text_dimension(&self) -> usize {
        self.text_dim
    }

    /// Embed one decoded image into a unit vector of `image_dimension()`.
    pub async fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        match self.snapshot_backend()? {
            BackendSnapshot::Stub { image_dim, .. } => {
                Ok(stub_embed(image.to_rgb8().as_raw(), image_dim))
            }
            BackendSnapshot::Ort(backend) => {
                let pixels = preprocess(image, self.image_size);
                spawn_blocking(move || backend.embed_image_blocking(pixels))
                    .await
                    .map_err(|e| EmbedderError::ModelError(format!("Join error: {e}")))?
            }
        }
    }

    /// Embed one text into a unit vector of `text_dimension()`.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        match self.snapshot_backend()? {
            BackendSnapshot::Stub { text_dim, .. } => Ok(stub_embed(text.as_bytes(), text_dim)),
            BackendSnapshot::Ort(backend) => {
                let owned = text.to_string();
                spawn_blocking(move || backend.embed_text_blocking(&owned))
                    .await
                    .map_err(|e| EmbedderError::ModelError(format!("Join error: {e}")))?
            }
        }
    }

    /// Release the underlying sessions and tokenizer. Idempotent; any
    /// embedding call after this returns [`EmbedderError::Closed`].
    pub fn close(&self) {
        let mut backend = self
            .backend
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !matches!(*backend, Backend::Closed) {
            log::info!("releasing embedding model");
        }
        *backend = Backend::Closed;
    }

    fn snapshot_backend(&self) -> Result<BackendSnapshot> {
        let backend = self
            .backend
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match &*backend {
            Backend::Ort(ort) => Ok(BackendSnapshot::Ort(ort.clone())),
            Backend::Stub {
                image_dim,
                text_dim,
            } => Ok(BackendSnapshot::Stub {
                image_dim: *image_dim,
                text_dim: *text_dim,
            }),
            Backend::Closed => Err(EmbedderError::Closed),
        }
    }

    #[must_use]
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

enum BackendSnapshot {
    Ort(Arc<OrtBackend>),
    Stub { image_dim: usize, text_dim: usize },
}
