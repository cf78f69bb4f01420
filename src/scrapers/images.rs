//! Hero image discovery and download.

use super::urls;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use std::error::Error;
use tracing::{debug, instrument};
use url::Url;

/// Find the most representative image of an article page.
///
/// The OpenGraph `og:image` tag wins when present. Otherwise the `<img>`
/// with the largest declared `width * height` is used; images without
/// numeric dimensions and inline `data:` URIs are ignored.
pub fn find_hero_image(page_url: &Url, html: &str) -> Option<Url> {
    let document = Html::parse_document(html);

    let og = Selector::parse("meta[property='og:image']").unwrap();
    if let Some(content) = document
        .select(&og)
        .filter_map(|m| m.value().attr("content"))
        .find(|c| !c.trim().is_empty())
    {
        return urls::resolve_http(page_url, content);
    }

    let img = Selector::parse("img[src]").unwrap();
    let mut best: Option<(u64, &str)> = None;
    for el in document.select(&img) {
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        if src.trim().is_empty() || src.starts_with("data:") {
            continue;
        }
        let dim = |name| el.value().attr(name).and_then(|v| v.trim().parse::<u64>().ok());
        let (Some(w), Some(h)) = (dim("width"), dim("height")) else {
            continue;
        };
        let area = w.saturating_mul(h);
        if area > best.map_or(0, |(a, _)| a) {
            best = Some((area, src));
        }
    }

    best.and_then(|(_, src)| urls::resolve_http(page_url, src))
}

/// File extension for an image content type; JPEG when unknown.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|c| c.split(';').next())
        .map(|c| c.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// A downloaded image body and its suggested extension.
#[derive(Debug)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Download the hero image of `page_url`.
///
/// `Ok(None)` means the page had no suitable image.
#[instrument(level = "info", skip(client))]
pub async fn download_hero_image(
    client: &Client,
    page_url: &str,
) -> Result<Option<DownloadedImage>, Box<dyn Error>> {
    let base = Url::parse(page_url)?;
    let html = client
        .get(page_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let Some(image_url) = find_hero_image(&base, &html) else {
        return Ok(None);
    };
    debug!(%image_url, "Selected hero image");

    let response = client.get(image_url).send().await?.error_for_status()?;
    let extension = extension_for(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let bytes = response.bytes().await?.to_vec();
    Ok(Some(DownloadedImage { bytes, extension }))
}
