//! Visual enhancement: hero images with alt text and captions.

use crate::api::AskAsync;
use crate::config::{Paths, Settings};
use crate::database;
use crate::models::{ArticleRecord, ImageMeta};
use crate::scrapers::{self, images, urls};
use crate::utils::{extract_json, sanitize_file_stem, take_chars, truncate_for_log};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument, warn};

pub const FALLBACK_ALT_TEXT: &str = "A descriptive image.";
pub const FALLBACK_CAPTION: &str = "An illustrative image related to the article.";
/// Characters of the summary given to the model.
pub const SUMMARY_CHARS: usize = 1000;

#[derive(Debug, Default, Deserialize)]
struct Visuals {
    alt_text: Option<String>,
    caption: Option<String>,
}

/// File name for a record's hero image, e.g. `TSMC expands in Arizona-1a2b3c4d.jpg`.
///
/// The suffix is taken from a hash of the normalized article URL, so titles
/// sharing their first 50 characters still get distinct files.
pub fn image_file_name(title: &str, url: &str, extension: &str) -> String {
    let digest = Sha256::digest(urls::normalize(url).as_bytes());
    format!(
        "{}-{}.{}",
        sanitize_file_stem(title),
        hex::encode(&digest[..4]),
        extension
    )
}

/// User text for the visuals template.
pub fn visuals_prompt(title: &str, summary: &str) -> String {
    format!(
        "Article title: {}\n\nArticle summary:\n{}",
        title,
        take_chars(summary, SUMMARY_CHARS)
    )
}

/// Read `{"alt_text", "caption"}` from a model response, filling gaps with
/// generic fallbacks.
pub fn parse_visuals(response: &str) -> (String, String) {
    let visuals: Visuals = match serde_json::from_str(extract_json(response, '{', '}')) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(response, 200),
                "Visuals response was not valid JSON; using fallbacks"
            );
            Visuals::default()
        }
    };
    let pick = |value: Option<String>, fallback: &str| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    };
    (
        pick(visuals.alt_text, FALLBACK_ALT_TEXT),
        pick(visuals.caption, FALLBACK_CAPTION),
    )
}

/// Find, download and describe the hero image of one record.
///
/// Download failures produce [`ImageMeta::failed`] so the record is not
/// retried on every run; model failures fall back to generic text.
#[instrument(level = "info", skip_all, fields(url = %record.url))]
pub async fn enhance_record<A>(
    client: &reqwest::Client,
    llm: &A,
    record: &ArticleRecord,
    images_dir: &Path,
) -> ImageMeta
where
    A: AskAsync<Response = String>,
{
    let downloaded = match images::download_hero_image(client, &record.url).await {
        Ok(Some(image)) => image,
        Ok(None) => {
            warn!("No suitable hero image found");
            return ImageMeta::failed();
        }
        Err(e) => {
            error!(error = %e, "Could not download hero image");
            return ImageMeta::failed();
        }
    };

    let file_name = image_file_name(&record.title, &record.url, downloaded.extension);
    if let Err(e) = fs::write(images_dir.join(&file_name), &downloaded.bytes).await {
        error!(error = %e, file = %file_name, "Could not save hero image");
        return ImageMeta::failed();
    }
    info!(file = %file_name, bytes = downloaded.bytes.len(), "Saved hero image");

    let (alt_text, caption) = match llm.ask(&visuals_prompt(&record.title, &record.summary)).await
    {
        Ok(response) => parse_visuals(&response),
        Err(e) => {
            error!(error = %e, "Image description failed; using fallbacks");
            (FALLBACK_ALT_TEXT.to_string(), FALLBACK_CAPTION.to_string())
        }
    };

    ImageMeta {
        path: format!("images/{}", file_name),
        alt_text,
        caption,
    }
}

/// Counts reported at the end of an enhancement run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnhanceReport {
    pub visited: usize,
    pub with_image: usize,
    pub failed: usize,
}

/// Whether any record in the database still lacks image metadata.
pub async fn needs_enhancement(paths: &Paths) -> Result<bool, Box<dyn Error>> {
    let records = database::load(&paths.database()).await?;
    Ok(records.iter().any(ArticleRecord::needs_image))
}

/// Enhance every record without image metadata and rewrite the database once.
#[instrument(level = "info", skip_all, fields(root = %paths.root.display()))]
pub async fn run<A>(
    paths: &Paths,
    settings: &Settings,
    llm: &A,
) -> Result<EnhanceReport, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let mut records = database::load(&paths.database()).await?;
    let targets: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.needs_image())
        .map(|(i, _)| i)
        .collect();

    let mut report = EnhanceReport::default();
    if records.is_empty() {
        info!("Database is empty; nothing to enhance");
        return Ok(report);
    }
    if targets.is_empty() {
        info!("All articles in the database already have images");
        return Ok(report);
    }

    let images_dir = paths.images_dir();
    fs::create_dir_all(&images_dir).await?;
    let client = scrapers::client(&settings.article_user_agent, settings.image_timeout())?;
    info!(count = targets.len(), "Enhancing articles");

    let results: Vec<(usize, ImageMeta)> = stream::iter(targets)
        .map(|i| {
            let record = &records[i];
            let client = &client;
            let images_dir = images_dir.as_path();
            async move { (i, enhance_record(client, llm, record, images_dir).await) }
        })
        .buffered(settings.parallelism.max(1))
        .collect()
        .await;

    for (i, meta) in results {
        report.visited += 1;
        if meta == ImageMeta::failed() {
            report.failed += 1;
        } else {
            report.with_image += 1;
        }
        records[i].set_image(meta);
    }

    database::rewrite(&paths.database(), &records).await?;
    info!(
        visited = report.visited,
        with_image = report.with_image,
        failed = report.failed,
        "Visual enhancement complete"
    );
    Ok(report)
}
