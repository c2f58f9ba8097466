use serde::{Deserialize, Serialize};

/// Statistics about one bulk indexing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of documents fully indexed
    pub documents: usize,

    /// Number of captions written
    pub captions: usize,

    /// Number of documents that failed
    pub failed: usize,

    /// Number of batches dispatched
    pub batches: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Errors encountered, one entry per failed document
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, captions: usize) {
        self.documents += 1;
        self.captions += captions;
    }

    pub fn add_error(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }

    /// Folds one batch's stats into the run total.
    pub fn merge(&mut self, other: IndexStats) {
        self.documents += other.documents;
        self.captions += other.captions;
        self.failed += other.failed;
        self.batches += other.batches;
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_accumulates_counts_and_errors() {
        let mut total = IndexStats::new();
        let mut batch = IndexStats::new();
        batch.add_document(5);
        batch.add_document(3);
        batch.add_error("doc x: undecodable".to_string());
        batch.batches = 1;

        total.merge(batch);
        assert_eq!(total.documents, 2);
        assert_eq!(total.captions, 8);
        assert_eq!(total.failed, 1);
        assert_eq!(total.batches, 1);
        assert_eq!(total.errors.len(), 1);
    }
}
