//! Resolving a gist locator to session content.
//!
//! Strategies run one at a time in a fixed order: raw URLs (no rate limit),
//! the API with a token, the API without one, and after a rate limit a
//! guess at common raw file names. Each failure is recorded; only once all
//! of them are exhausted does the caller see an error, which lists the
//! manual import steps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use time::OffsetDateTime;

use crate::detect::{Format, detect, looks_like_html};
use crate::error::ShareError;
use crate::host::{ACCEPT_API, ACCEPT_RAW, ContentHost, Hosts, HttpRequest, HttpResponse};
use crate::locator::extract_gist_id;

/// Raw file names probed when the API is rate limited. Arbitrarily named
/// files are missed.
pub const COMMON_FILENAMES: &[&str] = &[
    "session.jsonl",
    "claude-session.jsonl",
    "conversation.jsonl",
    "chat.jsonl",
    "session.md",
    "claude-session.md",
    "conversation.md",
    "chat.md",
    "README.md",
    "session-export.md",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Raw,
    AuthenticatedApi,
    UnauthenticatedApi,
    CommonFilenames,
    /// Content pasted by the user.
    Manual,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Raw => "raw URL",
            Strategy::AuthenticatedApi => "authenticated API",
            Strategy::UnauthenticatedApi => "unauthenticated API",
            Strategy::CommonFilenames => "common file names",
            Strategy::Manual => "manual paste",
        })
    }
}

/// Content and metadata of a resolved gist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched {
    pub id: String,
    pub title: String,
    pub content: String,
    pub page_url: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub source: Strategy,
    pub format: Format,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub strategy: Strategy,
    pub error: ShareError,
}

/// Every strategy failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveError {
    pub kind: ShareError,
    pub attempts: Vec<Attempt>,
    /// Absent when the locator itself was invalid.
    pub page_url: Option<String>,
}

impl ResolveError {
    fn invalid(kind: ShareError) -> Self {
        Self {
            kind,
            attempts: Vec::new(),
            page_url: None,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let Some(page_url) = &self.page_url else {
            return Ok(());
        };
        if !self.attempts.is_empty() {
            writeln!(f)?;
            write!(f, "\nTried:")?;
            for attempt in &self.attempts {
                write!(f, "\n  - {}: {}", attempt.strategy, attempt.error)?;
            }
        }
        write!(
            f,
            "\n\nTo import manually:\n  \
             1. Open {page_url}\n  \
             2. Click \"Raw\" on the session file\n  \
             3. Copy the entire content\n  \
             4. Run `sessionshare import --paste` and paste it"
        )
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    files: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    filename: Option<String>,
    #[serde(rename = "type", default)]
    mime: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

impl GistFile {
    fn is_session(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.ends_with(".jsonl")
            || self.mime.as_deref() == Some("text/plain")
            || lower.contains("session")
            || lower.contains("claude")
    }

    fn is_legacy_markdown(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.ends_with(".md")
            || self.mime.as_deref() == Some("text/markdown")
            || lower.contains("conversation")
    }
}

pub struct Resolver<H> {
    host: H,
    hosts: Hosts,
    token: Option<String>,
}

impl<H: ContentHost> Resolver<H> {
    pub fn new(host: H, hosts: Hosts, token: Option<String>) -> Self {
        Self {
            host,
            hosts,
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn hosts(&self) -> &Hosts {
        &self.hosts
    }

    /// Strategies `resolve` runs before any rate-limit fallback.
    pub fn plan(&self) -> Vec<Strategy> {
        let mut plan = vec![Strategy::Raw];
        if self.token.is_some() {
            plan.push(Strategy::AuthenticatedApi);
        }
        plan.push(Strategy::UnauthenticatedApi);
        plan
    }

    pub fn resolve(&self, locator: &str) -> Result<Fetched, ResolveError> {
        let id = extract_gist_id(locator).map_err(ResolveError::invalid)?;
        let mut attempts = Vec::new();

        for strategy in self.plan() {
            match self.try_strategy(strategy, &id) {
                Ok(fetched) => return Ok(fetched),
                Err(error) => attempts.push(Attempt { strategy, error }),
            }
        }

        if attempts.iter().any(|a| a.error.is_rate_limited()) {
            tracing::warn!(gist = %id, "API rate limited, probing common file names");
            match self.try_strategy(Strategy::CommonFilenames, &id) {
                Ok(fetched) => return Ok(fetched),
                Err(error) => attempts.push(Attempt {
                    strategy: Strategy::CommonFilenames,
                    error,
                }),
            }
        }

        Err(ResolveError {
            kind: final_kind(&attempts),
            attempts,
            page_url: Some(self.hosts.page_url(&id)),
        })
    }

    /// Run one strategy on its own, for callers that retry a single step.
    pub fn try_strategy(&self, strategy: Strategy, id: &str) -> Result<Fetched, ShareError> {
        tracing::debug!(gist = id, %strategy, "trying strategy");
        let result = match strategy {
            Strategy::Raw => self.fetch_raw(id, &self.hosts.raw_candidates(id), strategy),
            Strategy::AuthenticatedApi => match self.token.as_deref() {
                Some(token) => self.fetch_api(id, Some(token), strategy),
                None => Err(ShareError::MissingCredential),
            },
            Strategy::UnauthenticatedApi => self.fetch_api(id, None, strategy),
            Strategy::CommonFilenames => {
                let urls: Vec<String> = COMMON_FILENAMES
                    .iter()
                    .map(|name| self.hosts.raw_file_url(id, name))
                    .collect();
                self.fetch_raw(id, &urls, strategy)
            }
            Strategy::Manual => Err(ShareError::Unavailable {
                url: self.hosts.page_url(id),
                reason: "manual import needs pasted content".to_string(),
            }),
        };
        match &result {
            Ok(fetched) => tracing::info!(
                gist = id,
                %strategy,
                bytes = fetched.content.len(),
                format = fetched.format.as_str(),
                "fetched shared session"
            ),
            Err(err) => tracing::debug!(gist = id, %strategy, error = %err, "strategy failed"),
        }
        result
    }

    fn fetch_raw(
        &self,
        id: &str,
        urls: &[String],
        strategy: Strategy,
    ) -> Result<Fetched, ShareError> {
        let mut last_error = ShareError::Http {
            status: 404,
            url: self.hosts.page_url(id),
        };
        for url in urls {
            match self.get_raw(url) {
                Ok(content) => {
                    let title = match strategy {
                        Strategy::CommonFilenames => {
                            url.rsplit('/').next().unwrap_or(id).to_string()
                        }
                        _ => format!("Gist {id}"),
                    };
                    return Ok(self.fetched(id, title, content, strategy));
                }
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    /// A raw URL counts only when it returns a non-empty, non-HTML body.
    fn get_raw(&self, url: &str) -> Result<String, ShareError> {
        let response = self.host.get(&HttpRequest {
            url,
            accept: ACCEPT_RAW,
            token: None,
        })?;
        if !response.is_success() {
            return Err(ShareError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }
        if response.body.trim().is_empty() {
            return Err(ShareError::Unavailable {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }
        if looks_like_html(&response.body) {
            return Err(ShareError::Unavailable {
                url: url.to_string(),
                reason: "HTML page instead of raw content".to_string(),
            });
        }
        Ok(response.body)
    }

    fn fetch_api(
        &self,
        id: &str,
        token: Option<&str>,
        strategy: Strategy,
    ) -> Result<Fetched, ShareError> {
        let url = self.hosts.api_gist_url(id);
        let response = self.host.get(&HttpRequest {
            url: &url,
            accept: ACCEPT_API,
            token,
        })?;
        check_api_status(&response, &url)?;

        let gist: GistResponse = serde_json::from_str(&response.body)
            .map_err(|e| ShareError::Decode(format!("unexpected gist API response: {e}")))?;
        let (name, file) = select_file(&gist.files)
            .ok_or_else(|| ShareError::NoSessionFile(id.to_string()))?;

        let content = match (&file.content, file.truncated, &file.raw_url) {
            (_, true, Some(raw_url)) => {
                tracing::debug!(gist = id, file = %name, "file truncated by API, fetching raw_url");
                self.get_raw(raw_url)?
            }
            (Some(content), _, _) if !content.trim().is_empty() => content.clone(),
            _ => {
                return Err(ShareError::Unavailable {
                    url,
                    reason: format!("file {name} has no content"),
                });
            }
        };

        let title = gist
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| file.filename.clone())
            .unwrap_or(name);
        let mut fetched = self.fetched(id, title, content, strategy);
        if let Some(html_url) = gist.html_url {
            fetched.page_url = html_url;
        }
        fetched.created_at = gist.created_at;
        fetched.updated_at = gist.updated_at;
        Ok(fetched)
    }

    fn fetched(&self, id: &str, title: String, content: String, source: Strategy) -> Fetched {
        Fetched {
            id: id.to_string(),
            title,
            format: detect(&content),
            content,
            page_url: self.hosts.page_url(id),
            created_at: None,
            updated_at: None,
            source,
        }
    }
}

fn check_api_status(response: &HttpResponse, url: &str) -> Result<(), ShareError> {
    if response.is_success() {
        return Ok(());
    }
    if response.is_rate_limited() {
        let reset_at = response
            .rate_limit_reset
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
        return Err(ShareError::RateLimited { reset_at });
    }
    Err(ShareError::Http {
        status: response.status,
        url: url.to_string(),
    })
}

/// First session-looking file, else the first legacy markdown file.
fn select_file(files: &Map<String, Value>) -> Option<(String, GistFile)> {
    let parsed: Vec<(String, GistFile)> = files
        .iter()
        .filter_map(|(name, value)| {
            serde_json::from_value::<GistFile>(value.clone())
                .ok()
                .map(|file| (name.clone(), file))
        })
        .collect();
    let index = parsed
        .iter()
        .position(|(name, file)| file.is_session(name))
        .or_else(|| parsed.iter().position(|(name, file)| file.is_legacy_markdown(name)))?;
    parsed.into_iter().nth(index)
}

/// The error reported after every strategy failed: a rate limit beats a
/// missing session file, which beats a 404, which beats whatever came last.
fn final_kind(attempts: &[Attempt]) -> ShareError {
    let find = |pred: fn(&ShareError) -> bool| {
        attempts.iter().map(|a| &a.error).find(|e| pred(e)).cloned()
    };
    find(|e| e.is_rate_limited())
        .or_else(|| find(|e| matches!(e, ShareError::NoSessionFile(_))))
        .or_else(|| find(|e| matches!(e, ShareError::Http { status: 404, .. })))
        .or_else(|| attempts.last().map(|a| a.error.clone()))
        .unwrap_or(ShareError::Network("no strategy was attempted".to_string()))
}
