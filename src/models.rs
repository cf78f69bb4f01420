//! Data models shared by every pipeline stage.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleRecord`]: one entry of the Markdown article database
//! - [`Source`]: a news source (RSS/Atom feed or HTML landing page)
//! - [`ScrapedArticle`]: raw article text fetched from a candidate URL
//! - [`Relevance`]: the outcome of scoring an article against the knowledge base
//! - [`ImageMeta`]: hero image metadata attached to a record

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)score:\s*(\d+)").unwrap());

/// A processed article as stored in `database.md`.
///
/// The on-disk representation is a block of `Key: value` lines between
/// `--- ARTICLE START ---` and `--- ARTICLE END ---` markers; see
/// [`crate::database`] for the exact format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// The article title/headline.
    pub title: String,
    /// The URL the article was scraped from.
    pub url: String,
    /// The day the article was scored and summarized.
    pub date_processed: NaiveDate,
    /// Path of the downloaded hero image relative to the project root,
    /// or `download_failed` when no image could be fetched.
    pub image_path: Option<String>,
    /// Alt text describing the hero image.
    pub image_alt_text: Option<String>,
    /// One-sentence caption for the hero image.
    pub image_caption: Option<String>,
    /// Relevance justification; embeds `Score: N/10`.
    pub reason: String,
    /// Bullet-point summary produced by the LLM.
    pub summary: String,
    /// Header keys this crate does not know about, kept in file order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

/// Marker stored in `Image_Path` when the hero image download failed.
pub const IMAGE_DOWNLOAD_FAILED: &str = "download_failed";

impl ArticleRecord {
    /// Create a freshly scored record with no image metadata yet.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        date_processed: NaiveDate,
        reason: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            date_processed,
            image_path: None,
            image_alt_text: None,
            image_caption: None,
            reason: reason.into(),
            summary: summary.into(),
            extra: Vec::new(),
        }
    }

    /// Extract the integer relevance score embedded in the `Reason` text.
    ///
    /// For example `"High thematic relevance (Score: 8/10). ..."` -> `Some(8)`.
    pub fn relevance_score(&self) -> Option<u8> {
        SCORE_RE
            .captures(&self.reason)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Whether the visual enhancement stage has not visited this record yet.
    pub fn needs_image(&self) -> bool {
        self.image_path.is_none()
    }

    /// Whether a usable image file is attached.
    pub fn has_image(&self) -> bool {
        matches!(self.image_path.as_deref(), Some(p) if !p.is_empty() && p != IMAGE_DOWNLOAD_FAILED)
    }

    /// Attach image metadata, replacing whatever was there.
    pub fn set_image(&mut self, meta: ImageMeta) {
        self.image_path = Some(meta.path);
        self.image_alt_text = Some(meta.alt_text);
        self.image_caption = Some(meta.caption);
    }
}

/// A news source listed in the static config or generated for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    /// Human-readable name of the outlet.
    #[serde(default = "unnamed_source")]
    pub name: String,
    /// Feed or landing page URL.
    #[serde(default)]
    pub url: String,
}

fn unnamed_source() -> String {
    "Unnamed Source".to_string()
}

/// Raw article text fetched from a candidate URL.
#[derive(Debug, Clone)]
pub struct ScrapedArticle {
    /// The URL the article was fetched from.
    pub url: String,
    /// Page `<title>`, or `No Title Found`.
    pub title: String,
    /// Newline-joined paragraph text.
    pub content: String,
}

/// Outcome of a relevance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relevance {
    pub relevant: bool,
    pub score: Option<u8>,
    pub reason: String,
}

/// Hero image metadata produced by the enhancement stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub path: String,
    pub alt_text: String,
    pub caption: String,
}

impl ImageMeta {
    /// Metadata recorded when no image could be downloaded, so the record
    /// is not retried on every run.
    pub fn failed() -> Self {
        Self {
            path: IMAGE_DOWNLOAD_FAILED.to_string(),
            alt_text: String::new(),
            caption: String::new(),
        }
    }
}
