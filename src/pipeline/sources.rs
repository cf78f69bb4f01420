//! Topic-specific source generation and liveness validation.

use crate::api::AskAsync;
use crate::models::Source;
use crate::utils::{extract_json, looks_truncated, truncate_for_log};
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::error::Error;
use tracing::{info, instrument, warn};

/// User agent sent with validation requests.
pub const VALIDATOR_USER_AGENT: &str = "Hermes-Source-Validator/1.0";

/// Model output is lenient: names may be missing and urls may be null.
#[derive(Debug, Deserialize)]
struct GeneratedSource {
    name: Option<String>,
    url: Option<String>,
}

/// Parse the model's JSON array of `{name, url}` objects.
///
/// Entries without a url are dropped; missing names become `Unnamed Source`.
pub fn parse_sources(response: &str) -> Result<Vec<Source>, serde_json::Error> {
    let generated: Vec<GeneratedSource> =
        serde_json::from_str(extract_json(response, '[', ']'))?;
    Ok(generated
        .into_iter()
        .filter_map(|g| {
            let url = g.url?.trim().to_string();
            if url.is_empty() {
                return None;
            }
            let name = g
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unnamed Source".to_string());
            Some(Source { name, url })
        })
        .collect())
}

/// Ask the model for candidate news sources about `topic`.
///
/// A response cut off mid-JSON is re-asked once.
#[instrument(level = "info", skip_all)]
pub async fn generate<A>(llm: &A, topic: &str) -> Result<Vec<Source>, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    if topic.trim().is_empty() {
        return Err("topic paragraph is empty; cannot generate sources".into());
    }
    let prompt = format!("Topic: {}", topic.trim());
    info!("Asking the model for relevant news sources");

    let response = llm.ask(&prompt).await?;
    let mut parsed = parse_sources(&response);

    if let Err(ref e) = parsed {
        if looks_truncated(e) {
            warn!(error = %e, "EOF while parsing; re-asking once");
            let retry = llm.ask(&prompt).await?;
            parsed = parse_sources(&retry);
        }
    }

    match parsed {
        Ok(sources) => {
            info!(count = sources.len(), "Model generated potential sources");
            Ok(sources)
        }
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&response, 300),
                "Model returned non-conforming JSON"
            );
            Err(Box::new(e))
        }
    }
}

/// Keep the sources whose HEAD request answers `200 OK`.
///
/// Requests run `parallelism` at a time; the surviving sources keep their
/// input order.
#[instrument(level = "info", skip_all, fields(count = sources.len()))]
pub async fn validate(client: &Client, sources: Vec<Source>, parallelism: usize) -> Vec<Source> {
    let total = sources.len();
    let checked: Vec<Option<Source>> = stream::iter(sources)
        .map(|source| async move {
            info!(name = %source.name, url = %source.url, "Checking source");
            match client.head(&source.url).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    info!(name = %source.name, "Valid (200 OK)");
                    Some(source)
                }
                Ok(resp) => {
                    warn!(name = %source.name, status = %resp.status(), "Invalid source");
                    None
                }
                Err(e) => {
                    warn!(name = %source.name, error = %e, "Failed to connect");
                    None
                }
            }
        })
        .buffered(parallelism.max(1))
        .collect()
        .await;

    let live: Vec<Source> = checked.into_iter().flatten().collect();
    info!(live = live.len(), total, "Validation complete");
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::StubAsk;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_sources_lenient() {
        let response = r#"Here you go:
```json
[
  {"name": "Reuters Tech", "url": "https://www.reuters.com/technology/"},
  {"url": "https://semianalysis.com"},
  {"name": "No URL"},
  {"name": "Null URL", "url": null},
  {"name": "Blank", "url": "  "}
]
```"#;
        let sources = parse_sources(response).unwrap();
        assert_eq!(
            sources,
            vec![
                Source {
                    name: "Reuters Tech".to_string(),
                    url: "https://www.reuters.com/technology/".to_string()
                },
                Source {
                    name: "Unnamed Source".to_string(),
                    url: "https://semianalysis.com".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_reasks_on_truncation() {
        let llm = StubAsk::new([
            r#"[{"name": "A", "url": "https://a.example"}, {"name": "B", "#,
            r#"[{"name": "A", "url": "https://a.example"}]"#,
        ]);
        let sources = generate(&llm, "chips").await.unwrap();
        assert_eq!(sources.len(), 1);
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], "Topic: chips");
    }

    #[tokio::test]
    async fn test_generate_rejects_garbage() {
        let llm = StubAsk::always("I cannot help with that.");
        assert!(generate(&llm, "chips").await.is_err());
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_validate_keeps_only_ok() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/live"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/created"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let source = |name: &str, p: &str| Source {
            name: name.to_string(),
            url: format!("{}{}", server.uri(), p),
        };
        let sources = vec![
            source("Live", "/live"),
            source("Gone", "/gone"),
            source("Created", "/created"),
            source("Live again", "/live"),
        ];

        let client = crate::scrapers::client(VALIDATOR_USER_AGENT, Duration::from_secs(5)).unwrap();
        let live = validate(&client, sources, 2).await;
        let names: Vec<&str> = live.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Live", "Live again"]);
    }
}
