//! Command-line interface definitions for Hermes News.
//!
//! This module defines the CLI arguments and subcommands using the `clap` crate.
//! Global options can be provided via command-line flags or environment variables.

use crate::config::DEFAULT_TOPIC;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Hermes News pipeline.
///
/// Every stage reads and writes files under the project root, so stages can
/// be run one at a time or chained with `run`.
///
/// # Examples
///
/// ```sh
/// # Build the knowledge base and topic sources for a new theme
/// hermes_news research --topic "Quantum networking startups in Europe"
/// hermes_news sources --topic "Quantum networking startups in Europe"
///
/// # Daily update of a project in ./site
/// hermes_news --root ./site run --deploy
///
/// # Everything, from research to deployment
/// hermes_news run --full --deploy
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Project root holding config_hermes.yaml, database.md, images/ and output/
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Path to the static configuration (defaults to <root>/config_hermes.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the LLM config.yaml (defaults to awful_aj's config directory)
    #[arg(long, global = true, env = "HERMES_LLM_CONFIG")]
    pub llm_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// The research topic, shared by the commands that need one.
#[derive(Args, Debug, Clone)]
pub struct TopicArgs {
    /// Topic paragraph describing what the digest should follow
    #[arg(short, long, env = "HERMES_TOPIC_PARAGRAPH", default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

/// Pipeline stages and maintenance tasks.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Research the topic and write the knowledge base.
    Research(TopicArgs),

    /// Generate and validate news sources for the topic.
    Sources(TopicArgs),

    /// Find recently published articles from all sources.
    Discover,

    /// Score, summarize and store candidate articles.
    Filter,

    /// Download hero images and describe them.
    Enhance,

    /// Render the static website into build/.
    Site,

    /// Commit and push the project with git.
    Deploy,

    /// Deduplicate records and repair generation artifacts in summaries.
    Tidy {
        /// Also remove records whose summary is still corrupt after repair
        #[arg(long)]
        drop_corrupt: bool,
    },

    /// Export the database as JSON.
    Export {
        /// Output file (defaults to <root>/output/database.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run discover, filter, enhance and site in sequence.
    Run {
        /// Start with research and sources
        #[arg(long)]
        full: bool,

        /// Finish with deploy
        #[arg(long)]
        deploy: bool,

        #[command(flatten)]
        topic: TopicArgs,
    },
}
