//! # Hermes News
//!
//! A topic-driven news digest pipeline. Given a paragraph describing a
//! theme, it researches the theme with an LLM, finds sources, discovers
//! fresh articles, keeps the relevant ones with bullet-point summaries in a
//! Markdown database, illustrates them, and publishes a static website.
//!
//! ## Usage
//!
//! ```sh
//! hermes_news research --topic "..."
//! hermes_news run --deploy
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Research**: LLM report on the topic becomes the knowledge base
//! 2. **Sources**: LLM-suggested outlets, validated with HEAD requests
//! 3. **Discovery**: recent article URLs from feeds and crawled pages
//! 4. **Filtering**: relevance scoring and summarization (parallel)
//! 5. **Enhancement**: hero images with alt text and captions
//! 6. **Output**: static website, JSON export, git deployment

use clap::Parser;
use std::error::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod commands;
mod config;
mod database;
mod error;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod summary;
mod utils;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    info!(command = ?args.command, root = %args.root.display(), "hermes_news starting up");

    if let Err(e) = commands::run(args).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
