//! Cleanup of raw LLM completions before they are stored.
//!
//! Local models driven through a raw completion endpoint sometimes leak
//! their chat framing into the output (`<|channel|>analysis<|message|>...`),
//! prepend a conversational preamble, or degenerate into repeated filler.
//! [`clean_generation`] repairs what can be repaired and [`assess`] flags
//! what cannot.

use crate::models::ArticleRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Placeholder stored when summarization itself failed.
pub const SUMMARY_FAILED: &str = "Summarization failed due to an error.";

const FINAL_CHANNEL: &str = "<|channel|>final<|message|>";
const MESSAGE_TOKEN: &str = "<|message|>";

static CHAT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\|[a-z_]+\|>").unwrap());
static PREAMBLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*here(?: is|'s| are)\s+(?:a|an|the|your)?\s*[^:\n]*summar[^:\n]*:").unwrap()
});

/// Strip leaked chat framing and conversational preamble from a completion.
pub fn clean_generation(raw: &str) -> String {
    let mut text = raw;

    if let Some(idx) = text.rfind(FINAL_CHANNEL) {
        text = &text[idx + FINAL_CHANNEL.len()..];
    } else if text.contains("<|channel|>") {
        if let Some(idx) = text.rfind(MESSAGE_TOKEN) {
            text = &text[idx + MESSAGE_TOKEN.len()..];
        }
    }

    let stripped = CHAT_TOKEN_RE.replace_all(text, "");
    let without_preamble = PREAMBLE_RE.replace(&stripped, "");
    without_preamble.trim().to_string()
}

/// Whether a stored summary is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryQuality {
    Clean,
    Corrupt(&'static str),
}

/// Classify a (cleaned) summary.
pub fn assess(summary: &str) -> SummaryQuality {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return SummaryQuality::Corrupt("empty");
    }
    if trimmed == SUMMARY_FAILED {
        return SummaryQuality::Corrupt("summarization failed");
    }
    if trimmed.contains("<|") && trimmed.contains("|>") {
        return SummaryQuality::Corrupt("leaked chat tokens");
    }

    let words: Vec<String> = trimmed
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() >= 20 {
        let distinct: HashSet<&String> = words.iter().collect();
        if distinct.len() * 5 < words.len() {
            return SummaryQuality::Corrupt("repetitive filler");
        }
    }
    SummaryQuality::Clean
}

/// Result of a tidy pass over the database.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TidyReport {
    /// Records whose summary text changed during cleaning.
    pub repaired: usize,
    /// `(title, reason)` of records still corrupt after cleaning.
    pub corrupt: Vec<(String, &'static str)>,
}

/// Re-clean every summary in place and report the ones still corrupt.
pub fn tidy(records: &mut [ArticleRecord]) -> TidyReport {
    let mut report = TidyReport::default();
    for record in records.iter_mut() {
        let cleaned = clean_generation(&record.summary);
        if cleaned != record.summary {
            record.summary = cleaned;
            report.repaired += 1;
        }
        if let SummaryQuality::Corrupt(why) = assess(&record.summary) {
            report.corrupt.push((record.title.clone(), why));
        }
    }
    report
}
