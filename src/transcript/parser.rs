//! Transcript parsing: local assistant JSONL session files.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::types::{Message, Transcript};

/// Parse a local session file. The file stem is the fallback id and the
/// containing directory names the project.
pub fn parse_transcript(path: &Path) -> Result<Transcript> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session");
    let mut transcript = parse_transcript_str(&content, stem);
    transcript.project = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .map(str::to_string);
    Ok(transcript)
}

/// Parse session JSONL text. Lines that are not JSON, meta records and
/// records from roles other than user/assistant are skipped.
pub fn parse_transcript_str(content: &str, fallback_id: &str) -> Transcript {
    let mut transcript = Transcript::new(fallback_id, Vec::new());
    let mut session_id: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if session_id.is_none() {
            if let Some(id) = value.get("sessionId").and_then(|v| v.as_str()) {
                session_id = Some(id.to_string());
            }
        }

        if value.get("type").and_then(|v| v.as_str()) == Some("summary") {
            if let Some(summary) = value.get("summary").and_then(|v| v.as_str()) {
                transcript.summary = Some(summary.to_string());
            }
            continue;
        }

        if value.get("isMeta").and_then(|v| v.as_bool()) == Some(true) {
            continue;
        }

        if let Some(message) = Message::from_record(&value) {
            transcript.messages.push(message);
        }
    }

    if let Some(id) = session_id {
        transcript.id = id;
    }
    transcript
}
