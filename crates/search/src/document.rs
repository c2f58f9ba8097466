use image::DynamicImage;
use serde::Serialize;

/// One unit of indexable content: a decoded image, its captions, the URL
/// it will be served from, and optional descriptive tags.
#[derive(Clone)]
pub struct IndexableDocument {
    pub id: String,
    pub image: DynamicImage,
    pub captions: Vec<String>,
    pub image_url: String,
    pub tags: Vec<String>,
}

impl IndexableDocument {
    pub fn new(
        id: impl Into<String>,
        image: DynamicImage,
        captions: Vec<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            image,
            captions,
            image_url: image_url.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

impl std::fmt::Debug for IndexableDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexableDocument")
            .field("id", &self.id)
            .field("image", &format!("{}x{}", self.image.width(), self.image.height()))
            .field("captions", &self.captions)
            .field("image_url", &self.image_url)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Store-side identifiers carried alongside every result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResultMetadata {
    /// Identifier of the matched caption record. `None` for direct
    /// image-to-image matches.
    pub caption_id: Option<String>,
    /// Identifier of the image record the match resolves to. Empty when the
    /// store returned a caption without a resolvable image link.
    pub image_id: String,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// URL of the matched image; empty if the caption's image link could not
    /// be resolved.
    pub image_url: String,
    /// The caption that matched, when the match went through the caption
    /// collection.
    pub caption: Option<String>,
    /// Cosine distance between the query vector and the matched record.
    /// Smaller means more similar; results are ordered by this ascending.
    pub score: f32,
    pub metadata: ResultMetadata,
}
