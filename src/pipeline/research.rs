//! Topic research: turn a topic paragraph into the knowledge base document.

use crate::api::AskAsync;
use crate::summary::clean_generation;
use crate::utils::truncate_for_log;
use chrono::{DateTime, Local};
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Ask the model for a structured research report on `topic`.
///
/// An empty report is an error: nothing downstream can score articles
/// without a knowledge base.
#[instrument(level = "info", skip_all, fields(topic = %truncate_for_log(topic, 80)))]
pub async fn conduct<A>(llm: &A, topic: &str) -> Result<String, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    if topic.trim().is_empty() {
        return Err("topic paragraph is empty; cannot run research".into());
    }
    info!("Conducting deep research");
    let raw = llm.ask(topic.trim()).await?;
    let report = clean_generation(&raw);
    if report.is_empty() {
        error!(response_preview = %truncate_for_log(&raw, 300), "Model returned an empty report");
        return Err("research returned an empty report".into());
    }
    info!(chars = report.len(), "Research successful");
    Ok(report)
}

/// Markdown layout of the knowledge base.
pub fn render_knowledge_base(topic: &str, report: &str, generated: DateTime<Local>) -> String {
    let mut md = String::new();
    writeln!(md, "# Project Hermes: AI-Generated Knowledge Base").unwrap();
    writeln!(md).unwrap();
    writeln!(
        md,
        "_Generated on: {}_",
        generated.format("%B %d, %Y at %H:%M:%S")
    )
    .unwrap();
    writeln!(md).unwrap();
    writeln!(md, "## Topic").unwrap();
    writeln!(md).unwrap();
    writeln!(md, "{}", topic.trim()).unwrap();
    writeln!(md).unwrap();
    writeln!(md, "## Report").unwrap();
    writeln!(md).unwrap();
    writeln!(md, "{}", report.trim()).unwrap();
    md
}

/// Write the knowledge base, creating the output directory if needed.
#[instrument(level = "info", skip(topic, report), fields(path = %path.display()))]
pub async fn write_knowledge_base(
    path: &Path,
    topic: &str,
    report: &str,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, render_knowledge_base(topic, report, Local::now())).await?;
    info!("Knowledge base written");
    Ok(())
}

/// Read the knowledge base; missing or blank files are errors.
pub async fn read_knowledge_base(path: &Path) -> Result<String, Box<dyn Error>> {
    if !path.is_file() {
        return Err(format!(
            "knowledge base not found at {}; run `research` first",
            path.display()
        )
        .into());
    }
    let text = fs::read_to_string(path).await?;
    if text.trim().is_empty() {
        return Err(format!("knowledge base at {} is empty", path.display()).into());
    }
    Ok(text)
}
