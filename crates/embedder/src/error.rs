use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedderError>;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Embedder is closed")]
    Closed,

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}
