//! Project configuration: sources, tunables and on-disk layout.
//!
//! The static configuration lives in `config_hermes.yaml` at the project
//! root:
//!
//! ```yaml
//! sources:
//!   - name: Example Tech
//!     url: https://example.com/feed.xml
//! settings:
//!   window_hours: 48
//!   relevance_threshold: 8
//! ```
//!
//! Topic-specific sources generated by the `sources` command are kept
//! separately in `output/dynamic_sources.yaml` with the same `sources:` shape.

use crate::models::Source;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Default research topic used when none is supplied.
pub const DEFAULT_TOPIC: &str = "The emerging geopolitical risks affecting the global semiconductor \
supply chain, with a specific focus on the dependencies between US chip designers like NVIDIA, \
Taiwanese manufacturing by companies like TSMC, and Dutch ASML's dominance in EUV lithography equipment.";

/// Browser-like user agent used when fetching article bodies.
const ARTICLE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// Tunables with the pipeline's defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Only articles published within this many hours are discovered.
    pub window_hours: i64,
    /// Timeout for feed, page and article requests.
    pub request_timeout_secs: u64,
    /// Pause between article checks while crawling an HTML source.
    pub politeness_delay_ms: u64,
    /// Minimum LLM relevance score (out of 10) for an article to be kept.
    pub relevance_threshold: u8,
    /// Number of candidate articles processed concurrently.
    pub parallelism: usize,
    /// Upper bound on links checked per crawled HTML source.
    pub max_links_per_source: usize,
    /// An ad is inserted after every this many articles.
    pub ads_every: usize,
    /// Timeout for the HEAD request validating a generated source.
    pub validation_timeout_secs: u64,
    /// Timeout for hero image page and download requests.
    pub image_timeout_secs: u64,
    /// User agent for discovery requests.
    pub user_agent: String,
    /// User agent for article and image requests.
    pub article_user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window_hours: 72,
            request_timeout_secs: 25,
            politeness_delay_ms: 1000,
            relevance_threshold: 7,
            parallelism: 4,
            max_links_per_source: 200,
            ads_every: 5,
            validation_timeout_secs: 10,
            image_timeout_secs: 15,
            user_agent: "Hermes-News-Discoverer/1.0".to_string(),
            article_user_agent: ARTICLE_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

/// Contents of `config_hermes.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HermesConfig {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub settings: Settings,
}

/// Shape of `output/dynamic_sources.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceList {
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl HermesConfig {
    /// Load the static config, failing if the file is missing or invalid.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        let config: HermesConfig = serde_yaml::from_str(&text)?;
        info!(sources = config.sources.len(), "Loaded static configuration");
        Ok(config)
    }

    /// Load the static config, falling back to defaults if the file is absent.
    pub async fn load_or_default(path: &Path) -> Result<Self, Box<dyn Error>> {
        if path.is_file() {
            Self::load(path).await
        } else {
            info!(path = %path.display(), "No static configuration found; using defaults");
            Ok(Self::default())
        }
    }
}

/// Load topic-specific sources.
///
/// A missing file or one that is not a `sources:` mapping yields no sources.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_dynamic_sources(path: &Path) -> Result<Vec<Source>, Box<dyn Error>> {
    if !path.is_file() {
        info!("No dynamic sources file found; proceeding with static sources only");
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).await?;
    match serde_yaml::from_str::<SourceList>(&text) {
        Ok(list) => {
            info!(count = list.sources.len(), "Loaded AI-generated sources");
            Ok(list.sources)
        }
        Err(e) => {
            warn!(error = %e, "Dynamic sources file was not in the expected format; skipping");
            Ok(Vec::new())
        }
    }
}

/// Write topic-specific sources, always producing a `sources:` mapping.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = sources.len()))]
pub async fn save_dynamic_sources(path: &Path, sources: &[Source]) -> Result<(), Box<dyn Error>> {
    let list = SourceList {
        sources: sources.to_vec(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, serde_yaml::to_string(&list)?).await?;
    Ok(())
}

/// On-disk layout of a Hermes project, rooted at `--root`.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn static_config(&self) -> PathBuf {
        self.root.join("config_hermes.yaml")
    }

    pub fn dynamic_sources(&self) -> PathBuf {
        self.output_dir().join("dynamic_sources.yaml")
    }

    pub fn candidate_urls(&self) -> PathBuf {
        self.output_dir().join("candidate_urls.txt")
    }

    pub fn processed_log(&self) -> PathBuf {
        self.output_dir().join("processed_urls.log")
    }

    pub fn knowledge_base(&self) -> PathBuf {
        self.output_dir().join("knowledge_base.md")
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("database.md")
    }

    pub fn database_json(&self) -> PathBuf {
        self.output_dir().join("database.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn ads(&self) -> PathBuf {
        self.root.join("ads.md")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }
}
