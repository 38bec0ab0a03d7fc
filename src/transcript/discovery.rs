//! Transcript discovery: enumerating local session files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use walkdir::WalkDir;

use super::parser::parse_transcript;

/// A local session file with the metadata shown in listings.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub path: PathBuf,
    pub id: String,
    pub title: String,
    pub project_label: String,
    pub last_activity: Option<String>,
    pub message_count: usize,
}

/// Root of the assistant's per-project session folders.
pub fn claude_projects_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SESSIONSHARE_PROJECTS_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".claude").join("projects"))
}

/// List `<root>/<project>/<session>.jsonl` files, most recent activity first.
/// Sessions without any timestamp sort last. Unreadable files are skipped.
pub fn list_sessions(root: &Path) -> Result<Vec<SessionEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|s| s.to_str()) != Some("jsonl")
        {
            continue;
        }
        let transcript = match parse_transcript(path) {
            Ok(t) => t,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable session"
                );
                continue;
            }
        };
        entries.push(SessionEntry {
            path: path.to_path_buf(),
            id: transcript.id.clone(),
            title: transcript.title(),
            project_label: transcript.project_label(),
            last_activity: transcript.last_activity(),
            message_count: transcript.messages.len(),
        });
    }
    entries.sort_by_key(|e| {
        std::cmp::Reverse(
            e.last_activity
                .as_deref()
                .and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok()),
        )
    });
    Ok(entries)
}
