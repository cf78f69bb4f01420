//! The Markdown article database.
//!
//! Every relevant article ends up as one block in `database.md`:
//!
//! ```text
//! --- ARTICLE START ---
//! Title: Nvidia unveils new export-compliant chip
//! URL: https://example.com/nvidia-chip
//! Date_Processed: 2025-09-03
//! Image_Path: images/Nvidia unveils new export-compliant chip.jpg
//! Image_Alt_Text: A close-up of a GPU die
//! Image_Caption: The new part is built for the Chinese market.
//! Reason: High thematic relevance (Score: 8/10). Justification: ...
//! Summary:
//! - First bullet
//! - Second bullet
//! --- ARTICLE END ---
//! ```
//!
//! Parsing is line based. Header lines run until the `Summary:` line and
//! everything after it, up to the end marker, is the summary. A missing end
//! marker is tolerated: the block then ends at the next start marker or at
//! end of input.

use crate::error::DatabaseError;
use crate::models::ArticleRecord;
use crate::scrapers::urls;
use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

pub const START_MARKER: &str = "--- ARTICLE START ---";
pub const END_MARKER: &str = "--- ARTICLE END ---";

const SUMMARY_KEY: &str = "Summary:";

/// Parse the whole database text into records, in file order.
pub fn parse(text: &str) -> Result<Vec<ArticleRecord>, DatabaseError> {
    split_blocks(text)
        .into_iter()
        .map(|(line, body)| parse_block(line, &body))
        .collect()
}

/// Split the text into `(start marker line number, body lines)` pairs.
fn split_blocks(text: &str) -> Vec<(usize, Vec<&str>)> {
    let mut blocks = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for (idx, line) in text.lines().enumerate() {
        match line.trim() {
            START_MARKER => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some((idx + 1, Vec::new()));
            }
            END_MARKER => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {
                if let Some((_, body)) = current.as_mut() {
                    body.push(line);
                }
            }
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

fn split_header(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let valid = key.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '));
    valid.then(|| (key, value.trim()))
}

fn parse_block(start_line: usize, body: &[&str]) -> Result<ArticleRecord, DatabaseError> {
    let mut title = None;
    let mut url = None;
    let mut date = None;
    let mut image_path = None;
    let mut image_alt_text = None;
    let mut image_caption = None;
    let mut reason = None;
    let mut extra: Vec<(String, String)> = Vec::new();
    let mut summary = String::new();

    for (i, raw) in body.iter().enumerate() {
        let line_no = start_line + 1 + i;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(inline) = line.strip_prefix(SUMMARY_KEY) {
            let mut parts = Vec::with_capacity(body.len() - i);
            if !inline.trim().is_empty() {
                parts.push(inline.trim());
            }
            parts.extend(body[i + 1..].iter().copied());
            summary = parts.join("\n").trim().to_string();
            break;
        }

        let Some((key, value)) = split_header(line) else {
            warn!(line = line_no, content = %line, "Skipping unparseable header line");
            continue;
        };
        let value = value.to_string();

        match key {
            "Title" => title = Some(value),
            "URL" => url = Some(value),
            "Date_Processed" => {
                let parsed = NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                    DatabaseError::InvalidDate {
                        line: line_no,
                        value: value.clone(),
                    }
                })?;
                date = Some(parsed);
            }
            "Image_Path" => image_path = Some(value),
            "Image_Alt_Text" => image_alt_text = Some(value),
            "Image_Caption" => image_caption = Some(value),
            "Reason" => reason = Some(value),
            other => extra.push((other.to_string(), value)),
        }
    }

    let missing = |field| DatabaseError::MissingField {
        line: start_line,
        field,
    };

    Ok(ArticleRecord {
        title: title.ok_or_else(|| missing("Title"))?,
        url: url.ok_or_else(|| missing("URL"))?,
        date_processed: date.ok_or_else(|| missing("Date_Processed"))?,
        image_path,
        image_alt_text,
        image_caption,
        reason: reason.unwrap_or_default(),
        summary,
        extra,
    })
}

/// Header values must stay on one line.
fn one_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .join(" ")
}

/// Render one record as a database block, including the trailing blank line.
pub fn render_record(record: &ArticleRecord) -> String {
    let mut out = String::new();
    writeln!(out, "{}", START_MARKER).unwrap();
    writeln!(out, "Title: {}", one_line(&record.title)).unwrap();
    writeln!(out, "URL: {}", one_line(&record.url)).unwrap();
    writeln!(out, "Date_Processed: {}", record.date_processed.format("%Y-%m-%d")).unwrap();

    let optional = [
        ("Image_Path", &record.image_path),
        ("Image_Alt_Text", &record.image_alt_text),
        ("Image_Caption", &record.image_caption),
    ];
    for (key, value) in optional {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            writeln!(out, "{}: {}", key, one_line(v)).unwrap();
        }
    }

    writeln!(out, "Reason: {}", one_line(&record.reason)).unwrap();
    for (key, value) in &record.extra {
        writeln!(out, "{}: {}", key, one_line(value)).unwrap();
    }
    writeln!(out, "{}", SUMMARY_KEY).unwrap();
    if !record.summary.trim().is_empty() {
        writeln!(out, "{}", record.summary.trim()).unwrap();
    }
    writeln!(out, "{}", END_MARKER).unwrap();
    out.push('\n');
    out
}

/// Render all records in order.
pub fn render(records: &[ArticleRecord]) -> String {
    records.iter().map(render_record).collect()
}

/// Load the database; a missing file is an empty database.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load(path: &Path) -> Result<Vec<ArticleRecord>, DatabaseError> {
    if !path.is_file() {
        debug!("Database file not found; treating as empty");
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).await?;
    let records = parse(&text)?;
    info!(count = records.len(), "Loaded article database");
    Ok(records)
}

/// Append a single record to the end of the database file.
#[instrument(level = "info", skip_all, fields(path = %path.display(), url = %record.url))]
pub async fn append(path: &Path, record: &ArticleRecord) -> Result<(), DatabaseError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(render_record(record).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Replace the database contents with `records`.
///
/// The new content is written next to the database and renamed over it.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn rewrite(path: &Path, records: &[ArticleRecord]) -> Result<(), DatabaseError> {
    let tmp = path.with_extension("md.tmp");
    fs::write(&tmp, render(records)).await?;
    fs::rename(&tmp, path).await?;
    info!("Rewrote article database");
    Ok(())
}

/// Remove records whose normalized URLs repeat an earlier record.
///
/// The first occurrence is kept. If it has not been through image
/// enhancement but a later duplicate has, it takes over that metadata.
/// Returns the surviving records and the number removed.
pub fn dedupe(records: Vec<ArticleRecord>) -> (Vec<ArticleRecord>, usize) {
    let mut kept: Vec<ArticleRecord> = Vec::with_capacity(records.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut removed = 0;

    for record in records {
        let key = urls::normalize(&record.url);
        match seen.get(&key) {
            Some(&idx) => {
                removed += 1;
                let first = &mut kept[idx];
                if first.needs_image() && !record.needs_image() {
                    first.image_path = record.image_path;
                    first.image_alt_text = record.image_alt_text;
                    first.image_caption = record.image_caption;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    (kept, removed)
}

/// Stable sort by processing date, newest first.
pub fn sort_newest_first(records: &mut [ArticleRecord]) {
    records.sort_by(|a, b| b.date_processed.cmp(&a.date_processed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageMeta;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const SAMPLE: &str = "--- ARTICLE START ---
Title: Microsoft to use Anthropic models in Office 365
URL: https://www.example.com/microsoft-anthropic?utm_source=rss
Date_Processed: 2025-09-10
Image_Path: images/Microsoft to use Anthropic models in Office 365.jpg
Image_Alt_Text: Microsoft logo on a glass facade
Image_Caption: Microsoft diversifies its AI suppliers.
Reason: High thematic relevance (Score: 8/10). Justification: Directly about AI vendor dependencies.
Summary:
- Microsoft will license Anthropic models for some Office features.
- The move reduces reliance on a single AI supplier.
--- ARTICLE END ---

--- ARTICLE START ---
Title: Google expands Search Live
URL: https://example.org/search-live
Date_Processed: 2025-09-11
Reason: High thematic relevance (Score: 7/10). Justification: Consumer AI rollout.
Summary:
- Search Live is now available in the US.
--- ARTICLE END ---
";

    #[test]
    fn test_parse_sample() {
        let records = parse(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Microsoft to use Anthropic models in Office 365");
        assert_eq!(first.date_processed, date(2025, 9, 10));
        assert_eq!(
            first.image_caption.as_deref(),
            Some("Microsoft diversifies its AI suppliers.")
        );
        assert_eq!(first.relevance_score(), Some(8));
        assert_eq!(
            first.summary,
            "- Microsoft will license Anthropic models for some Office features.\n- The move reduces reliance on a single AI supplier."
        );

        let second = &records[1];
        assert!(second.needs_image());
        assert_eq!(second.summary, "- Search Live is now available in the US.");
    }

    #[test]
    fn test_render_then_parse_preserves_records() {
        let records = parse(SAMPLE).unwrap();
        let rendered = render(&records);
        assert_eq!(parse(&rendered).unwrap(), records);
    }

    #[test]
    fn test_title_with_colon_and_unknown_keys() {
        let text = "--- ARTICLE START ---
Title: Chips: the new oil
URL: https://example.com/chips
Date_Processed: 2025-01-02
Source_Feed: Example Feed
Reason: Score: 9/10
Summary:
text
--- ARTICLE END ---
";
        let records = parse(text).unwrap();
        assert_eq!(records[0].title, "Chips: the new oil");
        assert_eq!(
            records[0].extra,
            vec![("Source_Feed".to_string(), "Example Feed".to_string())]
        );
        assert!(render(&records).contains("Source_Feed: Example Feed\nSummary:"));
    }

    #[test]
    fn test_missing_end_marker_and_preamble() {
        let text = "# Hermes database\n\n--- ARTICLE START ---
Title: A
URL: https://a.example
Date_Processed: 2025-01-01
Reason: r
Summary:
first
--- ARTICLE START ---
Title: B
URL: https://b.example
Date_Processed: 2025-01-02
Reason: r
Summary:
second
";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].summary, "first");
        assert_eq!(records[1].summary, "second");
    }

    #[test]
    fn test_summary_inline_and_empty_reason() {
        let text = "--- ARTICLE START ---
Title: A
URL: https://a.example
Date_Processed: 2025-01-01
Summary: inline start
continued
--- ARTICLE END ---
";
        let records = parse(text).unwrap();
        assert_eq!(records[0].reason, "");
        assert_eq!(records[0].summary, "inline start\ncontinued");
    }

    #[test]
    fn test_missing_url_reports_block_line() {
        let text = "\n--- ARTICLE START ---\nTitle: A\nDate_Processed: 2025-01-01\nSummary:\nx\n--- ARTICLE END ---\n";
        match parse(text) {
            Err(DatabaseError::MissingField { line, field }) => {
                assert_eq!(line, 2);
                assert_eq!(field, "URL");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date_reports_line() {
        let text = "--- ARTICLE START ---\nTitle: A\nURL: u\nDate_Processed: yesterday\n--- ARTICLE END ---\n";
        match parse(text) {
            Err(DatabaseError::InvalidDate { line, value }) => {
                assert_eq!(line, 4);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbled_header_lines_are_skipped() {
        let text = "\
--- ARTICLE START ---
Title: A
URL: https://a.example
this is not a header
Date_Processed: 2025-01-01
Image Caption: a caption
Reason: r
Summary:
- a
--- ARTICLE END ---
--- ARTICLE START ---
Title: B
URL: https://b.example
Date_Processed: 2025-01-02
:: ???
Summary:
- b
--- ARTICLE END ---
";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reason, "r");
        assert_eq!(records[0].summary, "- a");
        assert_eq!(
            records[0].extra,
            vec![("Image Caption".to_string(), "a caption".to_string())]
        );
        assert_eq!(records[1].title, "B");
        assert!(records[1].extra.is_empty());
    }

    #[test]
    fn test_render_omits_empty_image_fields_and_joins_lines() {
        let mut record = ArticleRecord::new(
            "Multi\nline title",
            "https://example.com",
            date(2025, 2, 3),
            "Score: 7",
            "- a",
        );
        record.set_image(ImageMeta::failed());
        let text = render_record(&record);
        assert!(text.contains("Title: Multi line title\n"));
        assert!(text.contains("Image_Path: download_failed\n"));
        assert!(!text.contains("Image_Alt_Text"));
        assert!(text.ends_with("--- ARTICLE END ---\n\n"));

        let back = parse(&text).unwrap();
        assert_eq!(back[0].image_path.as_deref(), Some("download_failed"));
        assert!(!back[0].needs_image());
    }

    #[test]
    fn test_dedupe_keeps_first_and_inherits_image() {
        let plain = ArticleRecord::new(
            "A",
            "https://www.example.com/a?utm_medium=x",
            date(2025, 1, 1),
            "r",
            "s",
        );
        let mut enriched =
            ArticleRecord::new("A", "https://example.com/a", date(2025, 1, 2), "r2", "s2");
        enriched.set_image(ImageMeta {
            path: "images/A.jpg".to_string(),
            alt_text: "alt".to_string(),
            caption: "cap".to_string(),
        });
        let other = ArticleRecord::new("B", "https://example.com/b", date(2025, 1, 3), "r", "s");

        let (kept, removed) = dedupe(vec![plain, enriched, other]);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].reason, "r");
        assert_eq!(kept[0].image_path.as_deref(), Some("images/A.jpg"));
        assert_eq!(kept[1].title, "B");
    }

    #[test]
    fn test_sort_newest_first_is_stable() {
        let mut records = vec![
            ArticleRecord::new("old", "u1", date(2025, 1, 1), "", ""),
            ArticleRecord::new("new-a", "u2", date(2025, 3, 1), "", ""),
            ArticleRecord::new("new-b", "u3", date(2025, 3, 1), "", ""),
        ];
        sort_newest_first(&mut records);
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new-a", "new-b", "old"]);
    }

    #[tokio::test]
    async fn test_append_load_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.md");

        assert!(load(&path).await.unwrap().is_empty());

        let a = ArticleRecord::new("A", "https://a.example", date(2025, 1, 1), "Score: 8", "- a");
        let b = ArticleRecord::new("B", "https://b.example", date(2025, 1, 2), "Score: 9", "- b");
        append(&path, &a).await.unwrap();
        append(&path, &b).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, vec![a.clone(), b]);

        rewrite(&path, &[a.clone()]).await.unwrap();
        assert_eq!(load(&path).await.unwrap(), vec![a]);
        assert!(!path.with_extension("md.tmp").exists());
    }
}
