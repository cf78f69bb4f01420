//! HTML landing page crawling for sources that do not publish a feed.

use super::dates::parse_published;
use super::urls;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Same-host http(s) links found in `a[href]`, normalized, deduplicated and sorted.
pub fn same_site_links(base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();
    let base_host = base.host_str();

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| urls::resolve_http(base, href))
        .filter(|u| u.host_str() == base_host)
        .map(|u| urls::normalize(u.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Find an article's publication date in its HTML metadata.
///
/// Checked in order: `article:published_time`, `publication_date` meta tags,
/// then the first `<time datetime>` element. The first parseable value wins.
pub fn find_article_date(html: &str) -> Option<DateTime<Utc>> {
    let document = Html::parse_document(html);
    let candidates = [
        ("meta[property='article:published_time']", "content"),
        ("meta[name='publication_date']", "content"),
        ("time[datetime]", "datetime"),
    ];

    for (css, attr) in candidates {
        let selector = Selector::parse(css).unwrap();
        let parsed = document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .find_map(parse_published);
        if parsed.is_some() {
            return parsed;
        }
    }
    None
}
