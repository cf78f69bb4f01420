//! Utility functions for string handling, LLM response cleanup and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for prompts and logging
//! - JSON error detection and extraction for handling LLM responses
//! - Slug and file name generation
//! - Line-oriented list files (candidate URLs, processed URL log)
//! - File system validation for output directories

use std::collections::HashSet;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and a count
/// of the dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let head = take_chars(s, max);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// The first `n` characters of `s`, never splitting a code point.
pub fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Pull the JSON payload out of an LLM response.
///
/// Models like to wrap JSON in Markdown fences or prose. This returns the
/// slice from the first `open` to the last `close` delimiter, or the
/// trimmed input when either is missing (so truncation is still detected).
pub fn extract_json(response: &str, open: char, close: char) -> &str {
    let trimmed = response.trim();
    match (trimmed.find(open), trimmed.rfind(close)) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        (Some(start), _) => &trimmed[start..],
        _ => trimmed,
    }
}

/// Convert a title to a URL-friendly slug.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Test-Article!"), "test-article");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Turn an article title into a safe file stem of at most 50 characters.
pub fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    let stem = take_chars(cleaned.trim(), 50).trim().to_string();
    if stem.is_empty() || stem.starts_with('.') {
        format!("image{}", stem)
    } else {
        stem
    }
}

/// Read a list file: one entry per line, blank lines skipped.
///
/// A missing file is an empty list.
pub async fn read_lines(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).await?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Read a list file into a set.
pub async fn read_line_set(path: &Path) -> Result<HashSet<String>, Box<dyn Error>> {
    Ok(read_lines(path).await?.into_iter().collect())
}

/// Replace a list file with `lines`.
pub async fn write_lines(path: &Path, lines: &[String]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).await?;
    Ok(())
}

/// Append `lines` to a list file, creating it if needed.
pub async fn append_lines(path: &Path, lines: &[String]) -> Result<(), Box<dyn Error>> {
    if lines.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    for line in lines {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    Ok(())
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_take_chars_multibyte() {
        assert_eq!(take_chars("héllo", 2), "hé");
        assert_eq!(take_chars("abc", 10), "abc");
        assert_eq!(truncate_for_log("ééé", 1), "é…(+4 bytes)");
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let err = serde_json::from_str::<serde_json::Value>(json_eof).unwrap_err();
        assert!(looks_truncated(&err));

        let json_bad = r#"{"field": nope}"#;
        let err = serde_json::from_str::<serde_json::Value>(json_bad).unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[test]
    fn test_extract_json() {
        let fenced = "```json\n[{\"name\": \"A\"}]\n```";
        assert_eq!(extract_json(fenced, '[', ']'), "[{\"name\": \"A\"}]");
        assert_eq!(
            extract_json("Sure! {\"alt_text\": \"x\"} Enjoy.", '{', '}'),
            "{\"alt_text\": \"x\"}"
        );
        assert_eq!(extract_json("[{\"name\": \"A\"", '[', ']'), "[{\"name\": \"A\"");
        assert_eq!(extract_json("no json", '{', '}'), "no json");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Test-Article!"), "test-article");
        assert_eq!(slugify_title("Special@#$Characters"), "specialcharacters");
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(
            sanitize_file_stem("TSMC: \"record\" <profits> in Q3?"),
            "TSMC record profits in Q3"
        );
        assert_eq!(sanitize_file_stem(&"x".repeat(80)).len(), 50);
        assert_eq!(sanitize_file_stem("???"), "image");
        assert_eq!(sanitize_file_stem("../etc"), "image..etc");
    }

    #[tokio::test]
    async fn test_list_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("processed_urls.log");

        assert!(read_lines(&path).await.unwrap().is_empty());

        append_lines(&path, &["https://a.example".to_string()]).await.unwrap();
        append_lines(&path, &["https://b.example".to_string(), "".to_string()])
            .await
            .unwrap();
        let set = read_line_set(&path).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("https://b.example"));

        write_lines(&path, &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        ensure_writable_dir(&target).await.unwrap();
        assert!(target.is_dir());
    }
}
