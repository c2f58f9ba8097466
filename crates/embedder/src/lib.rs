//! # Lens Embedder
//!
//! Vision-language embedding on top of ONNX Runtime. A [`ClipEmbedder`]
//! wraps the two CLIP towers (visual and textual) and a tokenizer, and
//! produces L2-normalized vectors for images and texts. A deterministic
//! stub mode keeps tests and smoke runs model-free.

mod clip;
mod error;
mod preprocess;

pub use clip::{ClipConfig, ClipEmbedder, EmbeddingMode};
pub use error::{EmbedderError, Result};
pub use preprocess::preprocess;
