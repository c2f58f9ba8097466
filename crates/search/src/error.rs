use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedder error: {0}")]
    EmbedderError(#[from] lens_embedder::EmbedderError),

    #[error("Vector store error: {0}")]
    StoreError(#[from] lens_store::StoreError),

    #[error("{0}")]
    Other(String),
}
