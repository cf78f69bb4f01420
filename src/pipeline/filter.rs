//! Relevance filtering and summarization of candidate articles.
//!
//! Each candidate is scraped, scored against the knowledge base and, when
//! relevant, summarized and appended to `database.md`. Every URL that was
//! attempted is recorded in `output/processed_urls.log` so later discovery
//! runs do not offer it again.

use crate::api::AskAsync;
use crate::config::{Paths, Settings};
use crate::database;
use crate::models::{ArticleRecord, Relevance, ScrapedArticle};
use crate::scrapers::{self, article, urls};
use crate::summary::{SUMMARY_FAILED, clean_generation};
use crate::utils::{append_lines, read_lines, take_chars, truncate_for_log};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write;
use tracing::{error, info, instrument, warn};

/// Characters of the knowledge base included in a relevance prompt.
pub const KNOWLEDGE_BASE_CHARS: usize = 3000;
/// Characters of `title\n\ncontent` included in a relevance prompt.
pub const ARTICLE_CHARS: usize = 4000;
/// Characters of article content included in a summary prompt.
pub const SUMMARY_CONTENT_CHARS: usize = 6000;

pub const FORMAT_ERROR_REASON: &str = "LLM response format error.";
pub const ANALYSIS_ERROR_REASON: &str = "LLM analysis error.";

static RELEVANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)score:\s*(\d+).*?justification:\s*(.*)").unwrap());

/// User text for the relevance template.
pub fn relevance_prompt(knowledge_base: &str, article_text: &str) -> String {
    let mut prompt = String::new();
    writeln!(prompt, "--- KNOWLEDGE BASE (SUMMARY) ---").unwrap();
    writeln!(prompt, "{}", take_chars(knowledge_base, KNOWLEDGE_BASE_CHARS)).unwrap();
    writeln!(prompt).unwrap();
    writeln!(prompt, "--- NEWS ARTICLE ---").unwrap();
    write!(prompt, "{}", take_chars(article_text, ARTICLE_CHARS)).unwrap();
    prompt
}

/// Interpret a `Score: N. Justification: ...` response.
///
/// Only the first line of the justification is kept.
pub fn parse_relevance(response: &str, threshold: u8) -> Relevance {
    let cleaned = clean_generation(response);
    let parsed = RELEVANCE_RE.captures(&cleaned).and_then(|caps| {
        let score: u8 = caps.get(1)?.as_str().parse().ok()?;
        let justification = caps
            .get(2)
            .map(|m| m.as_str().lines().next().unwrap_or("").trim().to_string())
            .unwrap_or_default();
        Some((score, justification))
    });

    match parsed {
        Some((score, justification)) if score >= threshold => Relevance {
            relevant: true,
            score: Some(score),
            reason: format!(
                "High thematic relevance (Score: {}/10). Justification: {}",
                score, justification
            ),
        },
        Some((score, _)) => Relevance {
            relevant: false,
            score: Some(score),
            reason: format!("Low thematic relevance (Score: {}/10).", score),
        },
        None => {
            warn!(
                response = %truncate_for_log(response, 200),
                "Relevance check returned an unexpected format"
            );
            Relevance {
                relevant: false,
                score: None,
                reason: FORMAT_ERROR_REASON.to_string(),
            }
        }
    }
}

/// Score an article against the knowledge base.
///
/// Model failures count as "not relevant" rather than aborting the batch.
pub async fn check_relevance<A>(
    llm: &A,
    knowledge_base: &str,
    article: &ScrapedArticle,
    threshold: u8,
) -> Relevance
where
    A: AskAsync<Response = String>,
{
    let full_text = format!("{}\n\n{}", article.title, article.content);
    match llm.ask(&relevance_prompt(knowledge_base, &full_text)).await {
        Ok(response) => parse_relevance(&response, threshold),
        Err(e) => {
            error!(url = %article.url, error = %e, "Relevance check failed");
            Relevance {
                relevant: false,
                score: None,
                reason: ANALYSIS_ERROR_REASON.to_string(),
            }
        }
    }
}

/// User text for the summary template.
pub fn summary_prompt(title: &str, content: &str) -> String {
    format!(
        "**Article Title:** {}\n\n**Content:**\n{}",
        title,
        take_chars(content, SUMMARY_CONTENT_CHARS)
    )
}

/// Summarize an article as bullet points, falling back to a failure marker.
pub async fn summarize<A>(llm: &A, article: &ScrapedArticle) -> String
where
    A: AskAsync<Response = String>,
{
    match llm.ask(&summary_prompt(&article.title, &article.content)).await {
        Ok(response) => {
            let summary = clean_generation(&response);
            if summary.is_empty() {
                warn!(url = %article.url, "Model returned an empty summary");
                SUMMARY_FAILED.to_string()
            } else {
                summary
            }
        }
        Err(e) => {
            error!(url = %article.url, error = %e, "Summarization failed");
            SUMMARY_FAILED.to_string()
        }
    }
}

/// What happened to one candidate URL.
#[derive(Debug)]
pub enum Outcome {
    Saved(ArticleRecord),
    Skipped(Relevance),
    ScrapeFailed,
}

/// Counts reported at the end of a filter run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub attempted: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub already_stored: usize,
}

/// Everything needed to judge a candidate.
pub struct Filter<'a, R, S> {
    pub client: &'a Client,
    pub relevance: &'a R,
    pub summarizer: &'a S,
    pub knowledge_base: &'a str,
    pub threshold: u8,
    pub today: NaiveDate,
}

impl<'a, R, S> Filter<'a, R, S>
where
    R: AskAsync<Response = String>,
    S: AskAsync<Response = String>,
{
    /// Scrape, score and (if relevant) summarize one URL.
    #[instrument(level = "info", skip(self))]
    pub async fn process_url(&self, url: &str) -> Outcome {
        let scraped = match article::fetch(self.client, url).await {
            Ok(Some(a)) => a,
            Ok(None) => {
                error!("Failed to scrape content");
                return Outcome::ScrapeFailed;
            }
            Err(e) => {
                error!(error = %e, "Failed to scrape content");
                return Outcome::ScrapeFailed;
            }
        };

        info!("Checking relevance against knowledge base");
        let relevance =
            check_relevance(self.relevance, self.knowledge_base, &scraped, self.threshold).await;
        if !relevance.relevant {
            info!(reason = %relevance.reason, "Skipped");
            return Outcome::Skipped(relevance);
        }
        info!(reason = %relevance.reason, "Passed");

        let summary = summarize(self.summarizer, &scraped).await;
        Outcome::Saved(ArticleRecord::new(
            scraped.title,
            url,
            self.today,
            relevance.reason,
            summary,
        ))
    }

    /// Process `urls`, `parallelism` at a time.
    ///
    /// Records are appended to the database and URLs to the processed log
    /// in input order as results arrive. URLs already stored in the
    /// database, or repeated earlier in `urls` after normalization, are
    /// logged as processed without being fetched.
    #[instrument(level = "info", skip_all, fields(count = urls.len()))]
    pub async fn run(
        &self,
        urls: Vec<String>,
        paths: &Paths,
        parallelism: usize,
    ) -> Result<FilterReport, Box<dyn Error>> {
        let mut seen: HashSet<String> = database::load(&paths.database())
            .await?
            .iter()
            .map(|r| urls::normalize(&r.url))
            .collect();

        let mut report = FilterReport::default();
        let mut fresh = Vec::with_capacity(urls.len());
        let mut stored = Vec::new();
        for url in urls {
            if seen.insert(urls::normalize(&url)) {
                fresh.push(url);
            } else {
                stored.push(url);
            }
        }
        if !stored.is_empty() {
            info!(count = stored.len(), "Skipping URLs already stored or repeated");
            report.already_stored = stored.len();
            append_lines(&paths.processed_log(), &stored).await?;
        }

        info!(count = fresh.len(), "Processing candidate URLs");
        let mut results = stream::iter(fresh)
            .map(|url| async move {
                let outcome = self.process_url(&url).await;
                (url, outcome)
            })
            .buffered(parallelism.max(1));

        while let Some((url, outcome)) = results.next().await {
            report.attempted += 1;
            match outcome {
                Outcome::Saved(record) => {
                    database::append(&paths.database(), &record).await?;
                    info!(url = %url, title = %record.title, "Saved to database");
                    report.saved += 1;
                }
                Outcome::Skipped(_) => report.skipped += 1,
                Outcome::ScrapeFailed => report.failed += 1,
            }
            append_lines(&paths.processed_log(), &[url]).await?;
        }

        info!(
            attempted = report.attempted,
            saved = report.saved,
            skipped = report.skipped,
            failed = report.failed,
            "Filtering complete"
        );
        Ok(report)
    }
}

/// Candidate URLs waiting to be filtered; empty when there is no list.
pub async fn pending_urls(paths: &Paths) -> Result<Vec<String>, Box<dyn Error>> {
    let path = paths.candidate_urls();
    if !path.is_file() {
        info!(path = %path.display(), "No candidate URLs found to process");
        return Ok(Vec::new());
    }
    let urls = read_lines(&path).await?;
    if urls.is_empty() {
        info!(path = %path.display(), "Candidate URL file is empty");
    }
    Ok(urls)
}

/// HTTP client used to fetch article bodies.
pub fn article_client(settings: &Settings) -> Result<Client, reqwest::Error> {
    scrapers::client(&settings.article_user_agent, settings.request_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::StubAsk;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article_html(title: &str) -> String {
        let para = "Export controls on advanced lithography tools keep tightening across allied nations. ";
        format!(
            "<html><head><title>{}</title></head><body><p>{}</p><p>{}</p><p>{}</p></body></html>",
            title, para, para, para
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()
    }

    #[test]
    fn test_parse_relevance_high_and_low() {
        let high = parse_relevance(
            "Score: 8. Justification: Covers ASML export limits.\nExtra line",
            7,
        );
        assert!(high.relevant);
        assert_eq!(high.score, Some(8));
        assert_eq!(
            high.reason,
            "High thematic relevance (Score: 8/10). Justification: Covers ASML export limits."
        );

        let low = parse_relevance("score: 3. justification: Off topic.", 7);
        assert!(!low.relevant);
        assert_eq!(low.reason, "Low thematic relevance (Score: 3/10).");

        let edge = parse_relevance("Score: 7. Justification: Borderline.", 7);
        assert!(edge.relevant);
    }

    #[test]
    fn test_parse_relevance_format_error() {
        let r = parse_relevance("This article is very relevant!", 7);
        assert!(!r.relevant);
        assert_eq!(r.score, None);
        assert_eq!(r.reason, FORMAT_ERROR_REASON);
    }

    #[test]
    fn test_parse_relevance_strips_chat_framing() {
        let r = parse_relevance(
            "<|channel|>analysis<|message|>Think.<|end|><|start|>assistant<|channel|>final<|message|>Score: 9. Justification: Direct hit.",
            7,
        );
        assert_eq!(r.score, Some(9));
        assert!(r.reason.ends_with("Justification: Direct hit."));
    }

    #[test]
    fn test_prompts_are_truncated() {
        let kb = "k".repeat(5000);
        let text = "a".repeat(9000);
        let prompt = relevance_prompt(&kb, &text);
        assert!(prompt.contains(&"k".repeat(KNOWLEDGE_BASE_CHARS)));
        assert!(!prompt.contains(&"k".repeat(KNOWLEDGE_BASE_CHARS + 1)));
        assert!(prompt.ends_with(&"a".repeat(ARTICLE_CHARS)));
        assert!(!prompt.contains(&"a".repeat(ARTICLE_CHARS + 1)));

        let summary = summary_prompt("Title", &text);
        assert!(summary.starts_with("**Article Title:** Title\n\n**Content:**\n"));
        assert!(!summary.contains(&"a".repeat(SUMMARY_CONTENT_CHARS + 1)));
    }

    #[tokio::test]
    async fn test_check_relevance_llm_error() {
        let llm = StubAsk::default().then_fail("connection refused");
        let article = ScrapedArticle {
            url: "u".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        };
        let r = check_relevance(&llm, "kb", &article, 7).await;
        assert!(!r.relevant);
        assert_eq!(r.reason, ANALYSIS_ERROR_REASON);
    }

    #[tokio::test]
    async fn test_summarize_fallback() {
        let article = ScrapedArticle {
            url: "u".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        };
        let failing = StubAsk::default().then_fail("boom");
        assert_eq!(summarize(&failing, &article).await, SUMMARY_FAILED);

        let ok = StubAsk::always("Here is a summary of the article:\n- One\n- Two");
        assert_eq!(summarize(&ok, &article).await, "- One\n- Two");
    }

    #[tokio::test]
    async fn test_run_saves_relevant_and_logs_everything() {
        let server = MockServer::start().await;
        for (p, title) in [("/relevant", "Relevant Story"), ("/offtopic", "Off Topic")] {
            Mock::given(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string(article_html(title)))
                .mount(&server)
                .await;
        }
        Mock::given(path("/thin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>too short</p>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());

        let stored_url = format!("{}/stored", server.uri());
        database::append(
            &paths.database(),
            &ArticleRecord::new("Stored", stored_url.clone(), date(), "r", "- s"),
        )
        .await
        .unwrap();

        let relevance = StubAsk::new([
            "Score: 9. Justification: On topic.",
            "Score: 2. Justification: Unrelated.",
        ]);
        let summarizer = StubAsk::always("- Key point");
        let client = scrapers::client("test", Duration::from_secs(5)).unwrap();
        let filter = Filter {
            client: &client,
            relevance: &relevance,
            summarizer: &summarizer,
            knowledge_base: "Semiconductor supply chain risks",
            threshold: 7,
            today: date(),
        };

        let urls = vec![
            format!("{}/relevant", server.uri()),
            format!("{}/thin", server.uri()),
            format!("{}/offtopic", server.uri()),
            stored_url.clone(),
        ];
        // sequential so canned relevance answers line up with URLs
        let report = filter.run(urls.clone(), &paths, 1).await.unwrap();

        assert_eq!(
            report,
            FilterReport {
                attempted: 3,
                saved: 1,
                skipped: 1,
                failed: 1,
                already_stored: 1,
            }
        );

        let records = database::load(&paths.database()).await.unwrap();
        assert_eq!(records.len(), 2);
        let saved = &records[1];
        assert_eq!(saved.title, "Relevant Story");
        assert_eq!(saved.url, urls[0]);
        assert_eq!(saved.date_processed, date());
        assert_eq!(saved.relevance_score(), Some(9));
        assert_eq!(saved.summary, "- Key point");

        let logged = read_lines(&paths.processed_log()).await.unwrap();
        assert_eq!(logged.len(), 4);
        assert_eq!(logged[0], stored_url);
        assert_eq!(&logged[1..], &urls[..3]);

        assert!(relevance.prompts()[0].contains("Semiconductor supply chain risks"));
        assert!(summarizer.prompts()[0].starts_with("**Article Title:** Relevant Story"));
    }

    #[tokio::test]
    async fn test_run_collapses_repeated_candidates() {
        let server = MockServer::start().await;
        Mock::given(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_html("Story")))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let relevance = StubAsk::always("Score: 8. Justification: On topic.");
        let summarizer = StubAsk::always("- Point");
        let client = scrapers::client("test", Duration::from_secs(5)).unwrap();
        let filter = Filter {
            client: &client,
            relevance: &relevance,
            summarizer: &summarizer,
            knowledge_base: "kb",
            threshold: 7,
            today: date(),
        };

        let url = format!("{}/story", server.uri());
        let urls = vec![url.clone(), format!("{}?utm_source=x", url)];
        let report = filter.run(urls.clone(), &paths, 2).await.unwrap();

        assert_eq!(report.saved, 1);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.already_stored, 1);
        let records = database::load(&paths.database()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, url);
        assert_eq!(relevance.prompts().len(), 1);

        let logged = read_lines(&paths.processed_log()).await.unwrap();
        assert_eq!(logged, vec![urls[1].clone(), urls[0].clone()]);
    }

    #[tokio::test]
    async fn test_pending_urls() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        assert!(pending_urls(&paths).await.unwrap().is_empty());

        std::fs::create_dir_all(paths.output_dir()).unwrap();
        std::fs::write(paths.candidate_urls(), "https://a.example\n\nhttps://b.example\n").unwrap();
        assert_eq!(pending_urls(&paths).await.unwrap().len(), 2);
    }
}
