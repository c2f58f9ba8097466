use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Search error: {0}")]
    SearchError(#[from] lens_search::SearchError),

    #[error("Undecodable image for record '{id}': {source}")]
    UndecodableImage {
        id: String,
        #[source]
        source: image::ImageError,
    },

    #[error("{0}")]
    Other(String),
}
