//! Format detection for fetched or pasted session content.

use serde::Serialize;
use serde_json::Value;

const SAMPLE_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// A JSONL session stream, decoded with `codec::decode_jsonl`.
    Jsonl,
    /// Older markdown exports, shown as preformatted text.
    Markdown,
    /// Empty bodies and HTML pages.
    Unrecognized,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Jsonl => "jsonl",
            Format::Markdown => "markdown",
            Format::Unrecognized => "unrecognized",
        }
    }
}

/// Classify raw text by sampling its first five non-empty lines. At least
/// four out of five must be JSON objects for the text to count as JSONL.
pub fn detect(content: &str) -> Format {
    if content.trim().is_empty() || looks_like_html(content) {
        return Format::Unrecognized;
    }
    let sample: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(SAMPLE_LINES)
        .collect();
    let valid = sample.iter().filter(|line| is_json_object(line)).count();
    if valid * 5 >= sample.len() * 4 {
        Format::Jsonl
    } else {
        Format::Markdown
    }
}

/// Looser check for pasted text: any line that is a session record.
pub fn looks_like_session_jsonl(content: &str) -> bool {
    content.lines().any(|line| {
        serde_json::from_str::<Value>(line.trim())
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
            .is_some_and(|kind| matches!(kind.as_str(), "session_info" | "user" | "assistant"))
    })
}

/// Error pages served in place of raw content.
pub fn looks_like_html(content: &str) -> bool {
    let head: String = content.trim_start().chars().take(64).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn is_json_object(line: &str) -> bool {
    matches!(serde_json::from_str::<Value>(line), Ok(Value::Object(_)))
}
