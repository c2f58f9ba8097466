//! Dataset manifest loading.
//!
//! A dataset is a directory of images plus a JSONL manifest. Each manifest
//! line describes one document:
//!
//! ```json
//! {"id": "0001", "file": "images/0001.jpg", "captions": ["a dog"], "tags": ["dog"]}
//! ```
//!
//! `file` is relative to the manifest's directory. `id` defaults to the file
//! stem and `tags` to empty when omitted.

use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One raw dataset record, not yet decoded or embedded. Image bytes are read
/// later, per document, so a missing or corrupt file only fails that record.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: String,
    /// Bare file name, used to place the image under the static directory.
    pub filename: String,
    pub image_path: PathBuf,
    pub captions: Vec<String>,
    pub tags: Vec<String>,
}

/// A loaded manifest: parseable records plus descriptions of the lines that
/// were not.
#[derive(Debug, Default)]
pub struct Dataset {
    pub documents: Vec<RawDocument>,
    pub malformed: Vec<String>,
}

#[derive(Deserialize)]
struct ManifestRecord {
    #[serde(default)]
    id: Option<String>,
    file: String,
    captions: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parses a JSONL manifest. Malformed lines are collected, not fatal; only a
/// manifest that cannot be read at all is an error.
pub fn load_manifest(manifest_path: &Path) -> Result<Dataset> {
    let contents = std::fs::read_to_string(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut dataset = Dataset::default();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ManifestRecord>(line) {
            Ok(record) => match into_raw_document(record, base_dir) {
                Ok(document) => dataset.documents.push(document),
                Err(reason) => {
                    log::warn!("skipping manifest line {}: {reason}", index + 1);
                    dataset.malformed.push(format!("line {}: {reason}", index + 1));
                }
            },
            Err(e) => {
                log::warn!("skipping manifest line {}: {e}", index + 1);
                dataset.malformed.push(format!("line {}: {e}", index + 1));
            }
        }
    }
    log::info!(
        "loaded manifest {} ({} documents, {} malformed lines)",
        manifest_path.display(),
        dataset.documents.len(),
        dataset.malformed.len()
    );
    Ok(dataset)
}

fn into_raw_document(
    record: ManifestRecord,
    base_dir: &Path,
) -> std::result::Result<RawDocument, String> {
    let image_path = base_dir.join(&record.file);
    let filename = image_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| format!("no file name in '{}'", record.file))?;
    if record.captions.is_empty() {
        return Err(format!("'{filename}' has no captions"));
    }
    let id = record.id.unwrap_or_else(|| {
        image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&filename)
            .to_string()
    });
    Ok(RawDocument {
        id,
        filename,
        image_path,
        captions: record.captions,
        tags: record.tags,
    })
}
