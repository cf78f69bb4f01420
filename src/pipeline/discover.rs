//! Article discovery across feed and HTML sources.
//!
//! Every source is first read as a feed; sources that are not feeds are
//! crawled as HTML landing pages. Only articles published inside the
//! configured window and not already processed become candidates.

use crate::config::{HermesConfig, Paths, Settings, load_dynamic_sources};
use crate::models::Source;
use crate::scrapers::{self, crawl, feed};
use crate::utils::{read_line_set, take_chars, write_lines};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Collect candidate article URLs from `sources`.
///
/// The result is sorted, unique and excludes everything in `processed`.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), %cutoff))]
pub async fn discover(
    client: &Client,
    sources: &[Source],
    processed: &HashSet<String>,
    settings: &Settings,
    cutoff: DateTime<Utc>,
) -> Vec<String> {
    let mut found = BTreeSet::new();

    for source in sources {
        if source.url.trim().is_empty() {
            warn!(name = %source.name, "Source has no URL; skipping");
            continue;
        }
        info!(name = %source.name, url = %source.url, "Processing source");

        match feed::fetch(client, &source.url).await {
            Ok(Some(entries)) => {
                let before = found.len();
                found.extend(feed::recent_links(&entries, cutoff));
                info!(
                    name = %source.name,
                    new = found.len() - before,
                    "Found articles from feed"
                );
                continue;
            }
            Ok(None) => {
                warn!(name = %source.name, "Not a valid feed or empty; trying as HTML");
            }
            Err(e) => {
                warn!(name = %source.name, error = %e, "Feed request failed; trying as HTML");
            }
        }

        if let Err(e) = crawl_html_source(client, source, &mut found, settings, cutoff).await {
            error!(name = %source.name, error = %e, "Could not fetch HTML for source");
        }
    }

    found
        .into_iter()
        .filter(|url| !processed.contains(url))
        .collect()
}

/// Crawl a landing page and add its recently published same-site articles
/// to `found`. Returns the number of new articles.
#[instrument(level = "info", skip(client, found, settings), fields(name = %source.name))]
pub async fn crawl_html_source(
    client: &Client,
    source: &Source,
    found: &mut BTreeSet<String>,
    settings: &Settings,
    cutoff: DateTime<Utc>,
) -> Result<usize, Box<dyn Error>> {
    let base = Url::parse(&source.url)?;
    let html = client
        .get(base.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let links = crawl::same_site_links(&base, &html);
    let total = links.len();
    info!(links = total, "Checking potential links for recency");

    let mut found_count = 0usize;
    let mut checked = 0usize;
    for (i, article_url) in links.into_iter().enumerate() {
        if i > 0 && i % 10 == 0 {
            info!(checked = i, total, "Links checked");
        }
        if found.contains(&article_url) {
            continue;
        }
        if checked >= settings.max_links_per_source {
            warn!(limit = settings.max_links_per_source, "Link check limit reached");
            break;
        }
        checked += 1;

        info!(url = %take_chars(&article_url, 90), "Checking link");
        sleep(settings.politeness_delay()).await;

        let page = match client.get(&article_url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.text().await.ok(),
                Err(_) => None,
            },
            Err(_) => None,
        };
        let Some(page) = page else {
            continue;
        };

        if crawl::find_article_date(&page).is_some_and(|published| published >= cutoff) {
            info!(url = %article_url, "Found recent article");
            found.insert(article_url);
            found_count += 1;
        }
    }

    info!(new = found_count, "Finished crawling");
    Ok(found_count)
}

/// Run discovery for the project and write `output/candidate_urls.txt`.
///
/// Returns the number of candidates written.
#[instrument(level = "info", skip_all, fields(root = %paths.root.display()))]
pub async fn run(paths: &Paths, config: &HermesConfig) -> Result<usize, Box<dyn Error>> {
    let mut sources = config.sources.clone();
    info!(count = sources.len(), "Loaded static sources");
    sources.extend(load_dynamic_sources(&paths.dynamic_sources()).await?);

    if sources.is_empty() {
        warn!("No news sources found in static or dynamic configs");
        write_lines(&paths.candidate_urls(), &[]).await?;
        return Ok(0);
    }

    let processed = read_line_set(&paths.processed_log()).await?;
    info!(count = processed.len(), "Loaded previously processed URLs");

    let cutoff = Utc::now() - Duration::hours(config.settings.window_hours);
    info!(
        cutoff = %cutoff.format("%Y-%m-%d %H:%M:%S UTC"),
        sources = sources.len(),
        "Scanning sources"
    );

    let client = scrapers::client(
        &config.settings.user_agent,
        config.settings.request_timeout(),
    )?;
    let candidates = discover(&client, &sources, &processed, &config.settings, cutoff).await;

    write_lines(&paths.candidate_urls(), &candidates).await?;
    info!(
        count = candidates.len(),
        path = %paths.candidate_urls().display(),
        "Saved candidate list"
    );
    Ok(candidates.len())
}
