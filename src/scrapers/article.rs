//! Article text extraction.
//!
//! Pages are reduced to their paragraph text. Paragraphs nested in page
//! chrome (navigation, headers, footers, asides) or in script/style blocks
//! are ignored, as are short paragraphs which tend to be captions and
//! boilerplate.

use crate::models::ScrapedArticle;
use reqwest::Client;
use scraper::{Html, Selector};
use std::error::Error;
use tracing::{info, instrument, warn};

/// Paragraphs shorter than this many characters are skipped.
pub const MIN_PARAGRAPH_LENGTH: usize = 50;
/// Pages with less paragraph text than this are treated as failures.
pub const MIN_CONTENT_LENGTH: usize = 200;

const EXCLUDED_ANCESTORS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Collapse runs of whitespace to single spaces.
fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract meaningful paragraph text from an HTML document.
///
/// Returns `None` if the remaining text is shorter than [`MIN_CONTENT_LENGTH`].
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("p").unwrap();

    let paragraphs: Vec<String> = document
        .select(&selector)
        .filter(|p| {
            !p.ancestors().any(|node| {
                node.value()
                    .as_element()
                    .is_some_and(|el| EXCLUDED_ANCESTORS.contains(&el.name()))
            })
        })
        .map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| text.chars().count() >= MIN_PARAGRAPH_LENGTH)
        .collect();

    let article_text = paragraphs.join("\n");
    (article_text.chars().count() >= MIN_CONTENT_LENGTH).then_some(article_text)
}

/// The page `<title>`, or `No Title Found`.
pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").unwrap();
    document
        .select(&selector)
        .next()
        .map(|t| collapse_ws(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No Title Found".to_string())
}

/// Fetch and extract a single article.
///
/// `Ok(None)` means the page was reachable but did not contain enough text.
#[instrument(level = "info", skip(client))]
pub async fn fetch(client: &Client, url: &str) -> Result<Option<ScrapedArticle>, Box<dyn Error>> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let Some(content) = extract_text(&body) else {
        warn!("Page did not contain enough paragraph text");
        return Ok(None);
    };
    info!(chars = content.len(), "Extracted article text");

    Ok(Some(ScrapedArticle {
        url: url.to_string(),
        title: extract_title(&body),
        content,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long(prefix: &str) -> String {
        format!("{} {}", prefix, "semiconductor supply chains are under pressure. ".repeat(3))
    }

    #[test]
    fn test_extract_text_skips_chrome_and_short_paragraphs() {
        let html = format!(
            r#"<html><head><title> Chip   News </title></head><body>
            <header><p>{}</p></header>
            <nav><p>{}</p></nav>
            <article>
              <p>Short caption.</p>
              <p>{}</p>
              <p>{} <b>bold</b> tail</p>
            </article>
            <footer><p>{}</p></footer>
            </body></html>"#,
            long("HEADER"),
            long("NAV"),
            long("FIRST"),
            long("SECOND"),
            long("FOOTER"),
        );

        let text = extract_text(&html).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("FIRST"));
        assert!(lines[1].starts_with("SECOND"));
        assert!(lines[1].ends_with("bold tail"));
        assert!(!text.contains("HEADER"));
        assert!(!text.contains("NAV"));
        assert!(!text.contains("FOOTER"));
        assert_eq!(extract_title(&html), "Chip News");
    }

    #[test]
    fn test_extract_text_too_short() {
        let html = format!("<html><body><p>{}</p></body></html>", long("ONLY"));
        assert!(extract_text(&html).is_none());
    }

    #[test]
    fn test_extract_title_missing() {
        assert_eq!(extract_title("<html><body></body></html>"), "No Title Found");
    }

    #[tokio::test]
    async fn test_fetch_article() {
        let server = wiremock::MockServer::start().await;
        let html = format!(
            "<html><head><title>Story</title></head><body><p>{}</p><p>{}</p></body></html>",
            long("ONE"),
            long("TWO")
        );
        wiremock::Mock::given(wiremock::matchers::path("/story"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/story", server.uri());
        let article = fetch(&client, &url).await.unwrap().unwrap();
        assert_eq!(article.title, "Story");
        assert_eq!(article.url, url);
        assert_eq!(article.content.lines().count(), 2);

        assert!(fetch(&client, &format!("{}/missing", server.uri())).await.is_err());
    }
}
