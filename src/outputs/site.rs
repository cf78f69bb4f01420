//! Static website generation.
//!
//! The site is a single `build/index.html` listing every article newest
//! first, with ad snippets from `ads.md` woven in after every
//! `ads_every` articles. Hero images are copied into `build/images/`.
//!
//! # Output Structure
//!
//! ```text
//! build/
//! ├── index.html
//! └── images/
//!     └── TSMC expands in Arizona-1a2b3c4d.jpg
//! ```

use crate::config::{Paths, Settings};
use crate::database;
use crate::models::ArticleRecord;
use crate::utils::slugify_title;
use chrono::{DateTime, Local};
use itertools::Itertools;
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Options, Parser as MdParser, Tag, TagEnd, html as pulldown_html};
use regex::Regex;
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

pub const PAGE_TITLE: &str = "Hermes News Digest";

static AD_DELIMITER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Split `ads.md` into snippets. HTML comments separate ads.
pub fn parse_ads(text: &str) -> Vec<String> {
    AD_DELIMITER_RE
        .split(text)
        .map(str::trim)
        .filter(|ad| !ad.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load ad snippets; a missing `ads.md` means no ads.
pub async fn load_ads(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    Ok(parse_ads(&fs::read_to_string(path).await?))
}

/// One entry of the rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    Article(&'a ArticleRecord),
    Ad(&'a str),
}

/// Place ad `k` after article `(k + 1) * every` while ads remain.
pub fn interleave<'a>(
    records: &'a [ArticleRecord],
    ads: &'a [String],
    every: usize,
) -> Vec<Item<'a>> {
    let mut items = Vec::with_capacity(records.len() + ads.len());
    let mut remaining_ads = ads.iter();
    for (i, record) in records.iter().enumerate() {
        items.push(Item::Article(record));
        if every > 0 && (i + 1) % every == 0 {
            if let Some(ad) = remaining_ads.next() {
                items.push(Item::Ad(ad));
            }
        }
    }
    items
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    pulldown_cmark_escape::escape_html(&mut out, text).unwrap();
    out
}

fn is_web_link(dest: &str) -> bool {
    let lower = dest.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Render a Markdown summary to HTML.
///
/// Lines starting with `•` are treated as list items. Raw HTML is shown as
/// text, images are reduced to their alt text, and links are kept only
/// when they point at http(s) URLs.
pub fn render_summary(summary: &str) -> String {
    let markdown = summary
        .lines()
        .map(|line| match line.trim_start().strip_prefix('•') {
            Some(rest) => format!("- {}", rest.trim_start()),
            None => line.to_string(),
        })
        .join("\n");

    let mut dropped_link = false;
    let events = MdParser::new_ext(&markdown, Options::ENABLE_STRIKETHROUGH).filter_map(|event| {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
            Event::Start(Tag::Link { dest_url, .. }) if !is_web_link(&dest_url) => {
                dropped_link = true;
                None
            }
            Event::End(TagEnd::Link) if dropped_link => {
                dropped_link = false;
                None
            }
            Event::Start(Tag::Image { .. }) | Event::End(TagEnd::Image) => None,
            other => Some(other),
        }
    });

    let mut html = String::with_capacity(markdown.len() * 2);
    pulldown_html::push_html(&mut html, events);
    html
}

fn render_article(html: &mut String, record: &ArticleRecord) {
    writeln!(
        html,
        "<article class=\"article\" id=\"{}\">",
        escape_html(&slugify_title(&record.title))
    )
    .unwrap();

    if record.has_image() {
        let path = record.image_path.as_deref().unwrap_or_default();
        writeln!(html, "<figure>").unwrap();
        writeln!(
            html,
            "<img src=\"{}\" alt=\"{}\" loading=\"lazy\">",
            escape_html(path),
            escape_html(record.image_alt_text.as_deref().unwrap_or_default())
        )
        .unwrap();
        if let Some(caption) = record.image_caption.as_deref().filter(|c| !c.is_empty()) {
            writeln!(html, "<figcaption>{}</figcaption>", escape_html(caption)).unwrap();
        }
        writeln!(html, "</figure>").unwrap();
    }

    writeln!(
        html,
        "<h2><a href=\"{}\">{}</a></h2>",
        escape_html(&record.url),
        escape_html(&record.title)
    )
    .unwrap();
    writeln!(
        html,
        "<p class=\"meta\">Processed {} &middot; {}</p>",
        record.date_processed,
        escape_html(&record.reason)
    )
    .unwrap();
    writeln!(html, "<div class=\"summary\">").unwrap();
    html.push_str(&render_summary(&record.summary));
    writeln!(html, "</div>").unwrap();
    writeln!(html, "</article>").unwrap();
}

/// Render the whole page.
pub fn render_page(items: &[Item<'_>], generated: DateTime<Local>) -> String {
    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>").unwrap();
    writeln!(html, "<html lang=\"en\">").unwrap();
    writeln!(html, "<head>").unwrap();
    writeln!(html, "<meta charset=\"utf-8\">").unwrap();
    writeln!(
        html,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    )
    .unwrap();
    writeln!(html, "<title>{}</title>", PAGE_TITLE).unwrap();
    writeln!(html, "<style>").unwrap();
    writeln!(
        html,
        "body{{font-family:system-ui,sans-serif;max-width:52rem;margin:0 auto;padding:1rem;line-height:1.5}}"
    )
    .unwrap();
    writeln!(html, "article,.ad{{border-bottom:1px solid #ddd;padding:1rem 0}}").unwrap();
    writeln!(html, "img{{max-width:100%;height:auto}}").unwrap();
    writeln!(html, ".meta{{color:#666;font-size:.9rem}}").unwrap();
    writeln!(html, "</style>").unwrap();
    writeln!(html, "</head>").unwrap();
    writeln!(html, "<body>").unwrap();
    writeln!(html, "<header>").unwrap();
    writeln!(html, "<h1>{}</h1>", PAGE_TITLE).unwrap();
    writeln!(
        html,
        "<p class=\"meta\">Generated on {}</p>",
        generated.format("%B %d, %Y")
    )
    .unwrap();
    writeln!(html, "</header>").unwrap();
    writeln!(html, "<main>").unwrap();

    if items.is_empty() {
        writeln!(html, "<p>No articles yet.</p>").unwrap();
    }
    for item in items {
        match item {
            Item::Article(record) => render_article(&mut html, record),
            Item::Ad(ad) => {
                writeln!(html, "<aside class=\"ad\">").unwrap();
                writeln!(html, "{}", ad).unwrap();
                writeln!(html, "</aside>").unwrap();
            }
        }
    }

    writeln!(html, "</main>").unwrap();
    writeln!(html, "</body>").unwrap();
    writeln!(html, "</html>").unwrap();
    html
}

/// Copy a directory tree, returning the number of files copied.
pub async fn copy_dir(src: &Path, dst: &Path) -> Result<usize, Box<dyn Error>> {
    let mut copied = 0usize;
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Counts reported after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReport {
    pub articles: usize,
    pub ads: usize,
    pub images: usize,
    pub index: PathBuf,
}

/// Rebuild `build/` from the database, ads and images.
#[instrument(level = "info", skip_all, fields(root = %paths.root.display()))]
pub async fn build(paths: &Paths, settings: &Settings) -> Result<SiteReport, Box<dyn Error>> {
    let build_dir = paths.build_dir();
    if build_dir.exists() {
        info!(path = %build_dir.display(), "Clearing previous build directory");
        fs::remove_dir_all(&build_dir).await?;
    }
    fs::create_dir_all(&build_dir).await?;

    let images_dir = paths.images_dir();
    let images = if images_dir.is_dir() {
        let copied = copy_dir(&images_dir, &build_dir.join("images")).await?;
        info!(count = copied, "Copied images to build directory");
        copied
    } else {
        0
    };

    if !paths.database().is_file() {
        warn!(path = %paths.database().display(), "Database not found; website will be empty");
    }
    let mut records = database::load(&paths.database()).await?;
    database::sort_newest_first(&mut records);
    if records.is_empty() {
        info!("No articles found in the database; website will be empty");
    }

    let ads = load_ads(&paths.ads()).await?;
    let items = interleave(&records, &ads, settings.ads_every);
    let placed_ads = items.iter().filter(|i| matches!(i, Item::Ad(_))).count();

    let index = build_dir.join("index.html");
    fs::write(&index, render_page(&items, Local::now())).await?;
    info!(
        path = %index.display(),
        articles = records.len(),
        ads = placed_ads,
        "Website generated"
    );

    Ok(SiteReport {
        articles: records.len(),
        ads: placed_ads,
        images,
        index,
    })
}
