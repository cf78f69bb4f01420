//! Command routing: one function per subcommand.

use crate::api::{
    Llm, RELEVANCE_TEMPLATE, RESEARCH_TEMPLATE, SOURCES_TEMPLATE, SUMMARY_TEMPLATE,
    VISUALS_TEMPLATE,
};
use crate::cli::{Cli, Command, TopicArgs};
use crate::config::{HermesConfig, Paths, Settings, save_dynamic_sources};
use crate::database;
use crate::outputs::{json, site};
use crate::pipeline::{deploy, discover, enhance, filter, research, sources};
use crate::scrapers;
use crate::summary::{self, SummaryQuality};
use crate::utils::ensure_writable_dir;
use chrono::Local;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Resolved locations and options shared by every command.
#[derive(Debug)]
pub struct Context {
    pub paths: Paths,
    pub config_path: PathBuf,
    pub llm_config: Option<PathBuf>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        let paths = Paths::new(cli.root.clone());
        let config_path = cli.config.clone().unwrap_or_else(|| paths.static_config());
        Self {
            paths,
            config_path,
            llm_config: cli.llm_config.clone(),
        }
    }

    async fn settings(&self) -> Result<Settings, Box<dyn Error>> {
        Ok(HermesConfig::load_or_default(&self.config_path).await?.settings)
    }

    async fn llm(&self, templates: &[&'static str]) -> Result<Llm, Box<dyn Error>> {
        Llm::load(self.llm_config.as_deref(), templates).await
    }
}

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let ctx = Context::from_cli(&cli);
    ensure_writable_dir(&ctx.paths.output_dir()).await?;

    match cli.command {
        Command::Research(topic) => research_cmd(&ctx, &topic).await,
        Command::Sources(topic) => sources_cmd(&ctx, &topic).await,
        Command::Discover => discover_cmd(&ctx).await,
        Command::Filter => filter_cmd(&ctx).await,
        Command::Enhance => enhance_cmd(&ctx).await,
        Command::Site => site_cmd(&ctx).await,
        Command::Deploy => deploy_cmd(&ctx).await,
        Command::Tidy { drop_corrupt } => tidy_cmd(&ctx, drop_corrupt).await,
        Command::Export { out } => export_cmd(&ctx, out.as_deref()).await,
        Command::Run {
            full,
            deploy,
            topic,
        } => run_cmd(&ctx, full, deploy, &topic).await,
    }
}

/// Blank topics are rejected before any model or file is touched.
fn require_topic(topic: &TopicArgs) -> Result<(), Box<dyn Error>> {
    if topic.topic.trim().is_empty() {
        return Err("topic paragraph is empty; pass --topic or set HERMES_TOPIC_PARAGRAPH".into());
    }
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn research_cmd(ctx: &Context, topic: &TopicArgs) -> Result<(), Box<dyn Error>> {
    require_topic(topic)?;
    let llm = ctx.llm(&[RESEARCH_TEMPLATE]).await?;
    let report = research::conduct(&llm.asker(RESEARCH_TEMPLATE)?, &topic.topic).await?;
    research::write_knowledge_base(&ctx.paths.knowledge_base(), &topic.topic, &report).await
}

#[instrument(level = "info", skip_all)]
async fn sources_cmd(ctx: &Context, topic: &TopicArgs) -> Result<(), Box<dyn Error>> {
    require_topic(topic)?;
    let settings = ctx.settings().await?;
    let llm = ctx.llm(&[SOURCES_TEMPLATE]).await?;

    let generated = match sources::generate(&llm.asker(SOURCES_TEMPLATE)?, &topic.topic).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "Source generation failed; saving an empty source list");
            Vec::new()
        }
    };

    let client = scrapers::client(sources::VALIDATOR_USER_AGENT, settings.validation_timeout())?;
    let live = sources::validate(&client, generated, settings.parallelism).await;

    let path = ctx.paths.dynamic_sources();
    save_dynamic_sources(&path, &live).await?;
    if live.is_empty() {
        warn!(path = %path.display(), "No valid sources found; wrote an empty sources file");
    } else {
        info!(count = live.len(), path = %path.display(), "Saved validated sources");
    }
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn discover_cmd(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let config = HermesConfig::load(&ctx.config_path).await?;
    discover::run(&ctx.paths, &config).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn filter_cmd(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let urls = filter::pending_urls(&ctx.paths).await?;
    if urls.is_empty() {
        return Ok(());
    }

    let settings = ctx.settings().await?;
    let knowledge_base = research::read_knowledge_base(&ctx.paths.knowledge_base()).await?;
    let llm = ctx.llm(&[RELEVANCE_TEMPLATE, SUMMARY_TEMPLATE]).await?;
    let relevance = llm.asker(RELEVANCE_TEMPLATE)?;
    let summarizer = llm.asker(SUMMARY_TEMPLATE)?;
    let client = filter::article_client(&settings)?;

    let stage = filter::Filter {
        client: &client,
        relevance: &relevance,
        summarizer: &summarizer,
        knowledge_base: &knowledge_base,
        threshold: settings.relevance_threshold,
        today: Local::now().date_naive(),
    };
    stage.run(urls, &ctx.paths, settings.parallelism).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn enhance_cmd(ctx: &Context) -> Result<(), Box<dyn Error>> {
    if !enhance::needs_enhancement(&ctx.paths).await? {
        info!("No articles need images");
        return Ok(());
    }
    let settings = ctx.settings().await?;
    let llm = ctx.llm(&[VISUALS_TEMPLATE]).await?;
    enhance::run(&ctx.paths, &settings, &llm.asker(VISUALS_TEMPLATE)?).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn site_cmd(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let settings = ctx.settings().await?;
    site::build(&ctx.paths, &settings).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn deploy_cmd(ctx: &Context) -> Result<(), Box<dyn Error>> {
    deploy::run(&ctx.paths.root).await
}

#[instrument(level = "info", skip_all)]
async fn tidy_cmd(ctx: &Context, drop_corrupt: bool) -> Result<(), Box<dyn Error>> {
    let path = ctx.paths.database();
    let records = database::load(&path).await?;
    let before = records.len();

    let (mut records, duplicates) = database::dedupe(records);
    let report = summary::tidy(&mut records);
    for (title, reason) in &report.corrupt {
        warn!(%title, reason, "Corrupt summary");
    }
    if drop_corrupt {
        records.retain(|r| summary::assess(&r.summary) == SummaryQuality::Clean);
    }

    database::rewrite(&path, &records).await?;
    info!(
        before,
        after = records.len(),
        duplicates,
        repaired = report.repaired,
        corrupt = report.corrupt.len(),
        dropped = drop_corrupt,
        "Database tidied"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn export_cmd(ctx: &Context, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let records = database::load(&ctx.paths.database()).await?;
    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.paths.database_json());
    json::write_records(&records, &path).await
}

#[instrument(level = "info", skip(ctx, topic))]
async fn run_cmd(
    ctx: &Context,
    full: bool,
    deploy: bool,
    topic: &TopicArgs,
) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    if full {
        research_cmd(ctx, topic).await?;
        sources_cmd(ctx, topic).await?;
    }
    discover_cmd(ctx).await?;
    filter_cmd(ctx).await?;
    enhance_cmd(ctx).await?;
    site_cmd(ctx).await?;
    if deploy {
        deploy_cmd(ctx).await?;
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Pipeline complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;
    use chrono::NaiveDate;
    use clap::Parser;

    fn cli(root: &Path, args: &[&str]) -> Cli {
        let mut argv = vec!["hermes_news", "--root", root.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_context_paths() {
        let ctx = Context::from_cli(&cli(Path::new("/srv/h"), &["site"]));
        assert_eq!(ctx.config_path, PathBuf::from("/srv/h/config_hermes.yaml"));

        let ctx = Context::from_cli(&cli(Path::new("/srv/h"), &["-c", "/etc/h.yaml", "site"]));
        assert_eq!(ctx.config_path, PathBuf::from("/etc/h.yaml"));
    }

    #[tokio::test]
    async fn test_tidy_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let records = vec![
            ArticleRecord::new("A", "https://www.example.com/a", date, "r", "- a"),
            ArticleRecord::new(
                "A again",
                "https://example.com/a?utm_source=x",
                date,
                "r",
                "- a",
            ),
            ArticleRecord::new(
                "Broken",
                "https://example.com/b",
                date,
                "r",
                summary::SUMMARY_FAILED,
            ),
            ArticleRecord::new(
                "Leaky",
                "https://example.com/c",
                date,
                "r",
                "<|channel|>final<|message|>- c",
            ),
        ];
        database::rewrite(&paths.database(), &records).await.unwrap();

        run(cli(dir.path(), &["tidy", "--drop-corrupt"])).await.unwrap();
        let tidied = database::load(&paths.database()).await.unwrap();
        let titles: Vec<&str> = tidied.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "Leaky"]);
        assert_eq!(tidied[1].summary, "- c");

        run(cli(dir.path(), &["export"])).await.unwrap();
        let exported: Vec<ArticleRecord> =
            serde_json::from_str(&std::fs::read_to_string(paths.database_json()).unwrap()).unwrap();
        assert_eq!(exported, tidied);
    }

    #[tokio::test]
    async fn test_filter_without_candidates_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        run(cli(dir.path(), &["filter"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_requires_static_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(cli(dir.path(), &["discover"])).await.is_err());
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected_without_touching_sources() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        let existing = "sources:\n- name: Kept\n  url: https://kept.example\n";
        tokio::fs::create_dir_all(paths.output_dir()).await.unwrap();
        tokio::fs::write(paths.dynamic_sources(), existing).await.unwrap();

        assert!(run(cli(dir.path(), &["sources", "--topic", " "])).await.is_err());
        assert!(run(cli(dir.path(), &["research", "--topic", "\t"])).await.is_err());

        let after = std::fs::read_to_string(paths.dynamic_sources()).unwrap();
        assert_eq!(after, existing);
        assert!(!paths.knowledge_base().exists());
    }

    #[tokio::test]
    async fn test_run_halts_at_first_failing_stage() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());

        assert!(run(cli(dir.path(), &["run", "--deploy"])).await.is_err());
        assert!(!paths.candidate_urls().exists());
        assert!(!paths.build_dir().exists());
    }

    #[tokio::test]
    async fn test_full_run_with_blank_topic_stops_before_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        std::fs::write(
            paths.static_config(),
            "sources:\n- name: A\n  url: https://a.example\n",
        )
        .unwrap();

        assert!(run(cli(dir.path(), &["run", "--full", "--topic", " "])).await.is_err());
        assert!(!paths.knowledge_base().exists());
        assert!(!paths.candidate_urls().exists());
        assert!(!paths.build_dir().exists());
    }
}
