//! LLM API interaction with exponential backoff retry logic.
//!
//! This module provides the interface every LLM-driven stage talks to. It
//! includes automatic retry logic with exponential backoff and jitter to
//! handle transient failures gracefully.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//! - [`Llm`]: Loaded configuration plus the prompt templates of each stage
//!
//! Stages are generic over [`AskAsync`], so tests drive them with canned
//! responses instead of a model.
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use rand::{Rng, rng};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Template producing the research report that becomes the knowledge base.
pub const RESEARCH_TEMPLATE: &str = "hermes_research";
/// Template producing a JSON list of `{name, url}` news sources.
pub const SOURCES_TEMPLATE: &str = "hermes_sources";
/// Template producing a `Score: N. Justification: ...` line.
pub const RELEVANCE_TEMPLATE: &str = "hermes_relevance";
/// Template producing a bullet-point article summary.
pub const SUMMARY_TEMPLATE: &str = "hermes_summary";
/// Template producing `{"alt_text", "caption"}` JSON for a hero image.
pub const VISUALS_TEMPLATE: &str = "hermes_visuals";

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Reference to the LLM configuration (API keys, endpoints, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Reference to the chat template defining the conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => info!(elapsed_ms = dt.as_millis(), "API call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis(), error = %e, "API call failed"),
        }
        res
    }
}

/// A model client for one template, retried with backoff.
pub type BackoffAsk<'a> = RetryAsk<AskFnWrapper<'a>>;

/// LLM configuration plus the templates loaded for a run.
pub struct Llm {
    config: AwfulJadeConfig,
    templates: HashMap<&'static str, ChatTemplate>,
}

impl fmt::Debug for Llm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Llm")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Llm {
    /// Load the awful_aj configuration and the named templates.
    ///
    /// `config_path` defaults to `config.yaml` in awful_aj's config directory.
    #[instrument(level = "info", skip_all, fields(templates = ?template_names))]
    pub async fn load(
        config_path: Option<&Path>,
        template_names: &[&'static str],
    ) -> Result<Self, Box<dyn Error>> {
        let conf_file = match config_path {
            Some(p) => p.to_path_buf(),
            None => config_dir()?.join("config.yaml"),
        };
        let config_path = conf_file
            .to_str()
            .ok_or_else(|| format!("not a valid config filename: {}", conf_file.display()))?;
        let config = config::load_config(config_path)?;
        info!(config_path, "Loaded LLM configuration");

        let mut templates = HashMap::new();
        for &name in template_names {
            let template = template::load_template(name).await?;
            info!(template = name, "Loaded template");
            templates.insert(name, template);
        }
        Ok(Self { config, templates })
    }

    /// A retrying client bound to the named template.
    pub fn asker(&self, template_name: &str) -> Result<BackoffAsk<'_>, Box<dyn Error>> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| format!("template `{}` was not loaded", template_name))?;
        let client = AskFnWrapper {
            config: &self.config,
            template,
        };
        Ok(RetryAsk::new(client, 5, StdDuration::from_secs(1)))
    }
}
