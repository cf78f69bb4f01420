//! RSS 2.0 and Atom feed reading.
//!
//! Feeds are deserialized with `quick-xml`'s serde support into the few
//! fields discovery needs: the article link and its publication date.
//! A document that is neither a feed nor has any entries yields `None`, which
//! tells discovery to fall back to crawling the page as HTML.

use super::dates::parse_published;
use super::urls;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, instrument};

/// One feed item reduced to what discovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// The `alternate` link, or the first link without a `rel`.
    fn article_link(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| self.links.iter().find(|l| l.rel.is_none()))
            .and_then(|l| l.href.clone())
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an RSS or Atom document.
///
/// Returns `None` when the text is not a feed or the feed has no entries.
pub fn parse(xml: &str) -> Option<Vec<FeedEntry>> {
    if let Ok(rss) = quick_xml::de::from_str::<Rss>(xml) {
        let entries: Vec<FeedEntry> = rss
            .channel
            .items
            .into_iter()
            .filter_map(|item| {
                let link = non_empty(item.link)?;
                Some(FeedEntry {
                    link,
                    published: item.pub_date.as_deref().and_then(parse_published),
                })
            })
            .collect();
        if !entries.is_empty() {
            return Some(entries);
        }
    }

    let atom = quick_xml::de::from_str::<AtomFeed>(xml).ok()?;
    let entries: Vec<FeedEntry> = atom
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = non_empty(entry.article_link())?;
            let published = entry
                .published
                .as_deref()
                .or(entry.updated.as_deref())
                .and_then(parse_published);
            Some(FeedEntry { link, published })
        })
        .collect();
    (!entries.is_empty()).then_some(entries)
}

/// Normalized links of entries published at or after `cutoff`.
///
/// Entries without a parseable date are skipped.
pub fn recent_links(entries: &[FeedEntry], cutoff: DateTime<Utc>) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.published.is_some_and(|p| p >= cutoff))
        .map(|e| urls::normalize(&e.link))
        .collect()
}

/// Download `url` and try to read it as a feed.
#[instrument(level = "info", skip(client))]
pub async fn fetch(client: &Client, url: &str) -> Result<Option<Vec<FeedEntry>>, Box<dyn Error>> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let entries = parse(&body);
    debug!(entries = entries.as_ref().map_or(0, Vec::len), "Parsed feed");
    Ok(entries)
}
