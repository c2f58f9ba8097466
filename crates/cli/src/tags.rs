//! Query tag extraction.
//!
//! Tags narrow a text search to images labeled with at least one matching
//! tag. Extraction is best-effort by contract: any failure degrades to an
//! empty tag set and the search proceeds unfiltered.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[async_trait]
pub trait TagExtractor: Send + Sync {
    /// Never fails; problems are logged and map to no tags.
    async fn extract_tags(&self, query: &str) -> Vec<String>;
}

/// Disabled extraction: every query gets an empty tag set.
pub struct NoopTagExtractor;

#[async_trait]
impl TagExtractor for NoopTagExtractor {
    async fn extract_tags(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Extracts tags by asking a Gemini model for the salient nouns of the query.
pub struct GeminiTagExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiTagExtractor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn request_tags(&self, query: &str) -> anyhow::Result<Vec<String>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let prompt = format!(
            "List the concrete objects and attributes mentioned in this image \
             search query as lowercase single-word tags, comma separated, \
             nothing else: {query}"
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let response = response.error_for_status()?;
        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or_default();
        Ok(parse_tag_list(text))
    }
}

#[async_trait]
impl TagExtractor for GeminiTagExtractor {
    async fn extract_tags(&self, query: &str) -> Vec<String> {
        match self.request_tags(query).await {
            Ok(tags) => {
                log::debug!("extracted tags {tags:?} for '{query}'");
                tags
            }
            Err(e) => {
                log::warn!("tag extraction failed, searching without tags: {e}");
                Vec::new()
            }
        }
    }
}

fn parse_tag_list(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = text
        .split([',', '\n'])
        .map(|t| t.trim().trim_matches('.').to_lowercase())
        .filter(|t| !t.is_empty() && t.len() <= 32)
        .collect();
    tags.dedup();
    tags
}
