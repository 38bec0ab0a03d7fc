//! Share orchestration: turning a local transcript into a link or a gist.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{encode_legacy_blob, write_jsonl};
use crate::config::Config;
use crate::error::ShareError;
use crate::host::{ACCEPT_API, ContentHost, HttpRequest};
use crate::locator::{import_link, session_link};
use crate::optimize::{EncodeOptions, Limits, optimize};
use crate::transcript::parse_transcript;

/// Link mode only carries this many messages.
pub const URL_MODE_MAX_MESSAGES: usize = 10;
/// Longest link `auto` will still pick link mode for.
pub const URL_MODE_MAX_LINK_CHARS: usize = 8000;
pub const GIST_FILENAME: &str = "claude-session.jsonl";
pub const NEW_GIST_URL: &str = "https://gist.github.com/new";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    /// Embed the first messages in a #session= link
    Url,
    /// Write the full session as JSONL for a gist
    Gist,
    /// Link for short sessions, gist otherwise
    Auto,
}

#[derive(Debug)]
pub struct ShareOptions {
    pub transcript: PathBuf,
    pub mode: ShareMode,
    pub out: Option<PathBuf>,
    pub upload: bool,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShareOutcome {
    pub status: String,
    pub mode: ShareMode,
    pub transcript_path: String,
    pub session_id: String,
    pub title: String,
    /// `#session=` link, or `#import=` link for an uploaded gist.
    pub share_url: Option<String>,
    pub gist_url: Option<String>,
    pub file_path: Option<String>,
    pub bytes: usize,
    pub included_messages: usize,
    pub total_messages: usize,
    pub truncated: bool,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedGist {
    pub id: String,
    pub html_url: String,
}

pub fn share<H: ContentHost>(
    options: &ShareOptions,
    config: &Config,
    token: Option<&str>,
    host: &H,
) -> Result<ShareOutcome> {
    let transcript = parse_transcript(&options.transcript)?;
    let total_messages = transcript.messages.len();
    let link = session_link(&config.viewer_url, &encode_legacy_blob(&transcript));

    let mode = match options.mode {
        ShareMode::Auto
            if total_messages <= URL_MODE_MAX_MESSAGES
                && link.chars().count() <= URL_MODE_MAX_LINK_CHARS =>
        {
            ShareMode::Url
        }
        ShareMode::Auto => ShareMode::Gist,
        explicit => explicit,
    };
    tracing::debug!(?mode, messages = total_messages, link_chars = link.len(), "share mode chosen");

    let mut outcome = ShareOutcome {
        status: "ready".to_string(),
        mode,
        transcript_path: options.transcript.display().to_string(),
        session_id: transcript.id.clone(),
        title: transcript.title(),
        share_url: None,
        gist_url: None,
        file_path: None,
        bytes: 0,
        included_messages: 0,
        total_messages,
        truncated: false,
        note: String::new(),
    };

    if mode == ShareMode::Url {
        if options.upload {
            bail!("--upload only applies to gist mode");
        }
        let included = total_messages.min(URL_MODE_MAX_MESSAGES);
        outcome.bytes = link.len();
        outcome.included_messages = included;
        outcome.truncated = included < total_messages;
        outcome.note = if outcome.truncated {
            format!(
                "link contains the first {included} of {total_messages} messages; \
                 use --mode gist for the rest"
            )
        } else {
            "open the link to view the session".to_string()
        };
        outcome.share_url = Some(link);
        return Ok(outcome);
    }

    let encode = EncodeOptions::now(Limits::with_budget(config.budget_bytes));
    let optimized = optimize(&transcript, &encode);
    let jsonl = write_jsonl(&optimized, &encode.shared_at);
    outcome.bytes = jsonl.len();
    outcome.included_messages = optimized.messages.len();
    outcome.truncated = optimized.truncation.is_some();

    let path = options
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(GIST_FILENAME));
    write_file(&path, &jsonl)?;
    outcome.file_path = Some(path.display().to_string());

    if options.upload {
        let Some(token) = token else {
            bail!(
                "--upload needs a GitHub token: run `sessionshare config set github_token <token>`"
            );
        };
        let description = options
            .description
            .clone()
            .unwrap_or_else(|| format!("Claude session: {}", outcome.title));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(GIST_FILENAME);
        let created = create_gist(
            host,
            &config.hosts.api_gists_url(),
            token,
            filename,
            &jsonl,
            &description,
        )
        .context("failed to create gist")?;
        tracing::info!(gist = %created.id, bytes = jsonl.len(), "created gist");
        outcome.share_url = Some(import_link(&config.viewer_url, &created.html_url));
        outcome.gist_url = Some(created.html_url);
        outcome.status = "uploaded".to_string();
        outcome.note = "uploaded successfully".to_string();
    } else {
        outcome.note = format!("create a public gist from {} to share it", path.display());
    }

    Ok(outcome)
}

/// Steps for creating the gist by hand.
pub fn manual_gist_steps(file_path: &str, viewer_url: &str) -> Vec<String> {
    vec![
        format!("Open {NEW_GIST_URL}"),
        format!("Paste the content of {file_path} (or drag the file in)"),
        format!("Name the file {GIST_FILENAME} and create a public gist"),
        format!("Share {viewer_url}#import=<gist url>, or run `sessionshare import <gist url>`"),
    ]
}

/// Create a public gist holding one file.
pub fn create_gist<H: ContentHost>(
    host: &H,
    url: &str,
    token: &str,
    filename: &str,
    content: &str,
    description: &str,
) -> Result<CreatedGist, ShareError> {
    let body = json!({
        "description": description,
        "public": true,
        "files": { filename: { "content": content } },
    });
    let response = host.post_json(
        &HttpRequest {
            url,
            accept: ACCEPT_API,
            token: Some(token),
        },
        &body,
    )?;
    if response.is_rate_limited() {
        let reset_at = response
            .rate_limit_reset
            .and_then(|secs| time::OffsetDateTime::from_unix_timestamp(secs).ok());
        return Err(ShareError::RateLimited { reset_at });
    }
    if !response.is_success() {
        return Err(ShareError::Http {
            status: response.status,
            url: url.to_string(),
        });
    }
    serde_json::from_str(&response.body)
        .map_err(|e| ShareError::Decode(format!("unexpected gist API response: {e}")))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
