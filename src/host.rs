//! HTTP access to the gist host.
//!
//! The resolver and the uploader only see [`ContentHost`], so tests can
//! script responses without a network.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::ShareError;

pub const USER_AGENT: &str = concat!("sessionshare/", env!("CARGO_PKG_VERSION"));
pub const ACCEPT_RAW: &str = "text/plain,application/json,*/*";
pub const ACCEPT_API: &str = "application/vnd.github.v3+json";

/// Base URLs of the gist service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hosts {
    #[serde(default = "default_web")]
    pub web: String,
    #[serde(default = "default_raw")]
    pub raw: String,
    #[serde(default = "default_api")]
    pub api: String,
}

fn default_web() -> String {
    "https://gist.github.com".to_string()
}

fn default_raw() -> String {
    "https://gist.githubusercontent.com".to_string()
}

fn default_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            web: default_web(),
            raw: default_raw(),
            api: default_api(),
        }
    }
}

impl Hosts {
    pub fn page_url(&self, id: &str) -> String {
        format!("{}/{id}", self.web.trim_end_matches('/'))
    }

    pub fn api_gist_url(&self, id: &str) -> String {
        format!("{}/gists/{id}", self.api.trim_end_matches('/'))
    }

    pub fn api_gists_url(&self) -> String {
        format!("{}/gists", self.api.trim_end_matches('/'))
    }

    /// Raw URLs tried first, in order.
    pub fn raw_candidates(&self, id: &str) -> Vec<String> {
        let raw = self.raw.trim_end_matches('/');
        let web = self.web.trim_end_matches('/');
        vec![
            format!("{raw}/raw/{id}/claude-session.jsonl"),
            format!("{raw}/raw/{id}"),
            format!("{web}/{id}/raw/claude-session.jsonl"),
            format!("{web}/{id}/raw"),
        ]
    }

    pub fn raw_file_url(&self, id: &str, name: &str) -> String {
        format!("{}/{id}/raw/{name}", self.raw.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub accept: &'a str,
    /// Sent as `Authorization: token <value>`.
    pub token: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// `X-RateLimit-Reset`, unix seconds.
    pub rate_limit_reset: Option<i64>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            rate_limit_reset: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            rate_limit_reset: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 403 and 429 from the API are rate limits.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status, 403 | 429)
    }
}

/// Non-success statuses come back as `Ok`; only transport failures are errors.
pub trait ContentHost {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, ShareError>;

    fn post_json(&self, request: &HttpRequest<'_>, body: &Value)
    -> Result<HttpResponse, ShareError>;
}

impl<T: ContentHost + ?Sized> ContentHost for &T {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, ShareError> {
        (**self).get(request)
    }

    fn post_json(
        &self,
        request: &HttpRequest<'_>,
        body: &Value,
    ) -> Result<HttpResponse, ShareError> {
        (**self).post_json(request, body)
    }
}

pub struct UreqHost {
    agent: ureq::Agent,
}

impl UreqHost {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn finish(
        url: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<HttpResponse, ShareError> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(ShareError::Network(format!("{url}: {transport}")));
            }
        };
        let status = response.status();
        let rate_limit_reset = response
            .header("X-RateLimit-Reset")
            .and_then(|v| v.trim().parse::<i64>().ok());
        let body = response
            .into_string()
            .map_err(|e| ShareError::Network(format!("{url}: failed to read body: {e}")))?;
        Ok(HttpResponse {
            status,
            body,
            rate_limit_reset,
        })
    }

    fn request(&self, method: &str, request: &HttpRequest<'_>) -> ureq::Request {
        let mut req = self
            .agent
            .request(method, request.url)
            .set("Accept", request.accept);
        if let Some(token) = request.token {
            req = req.set("Authorization", &format!("token {token}"));
        }
        req
    }
}

impl ContentHost for UreqHost {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, ShareError> {
        tracing::debug!(url = request.url, auth = request.token.is_some(), "GET");
        Self::finish(request.url, self.request("GET", request).call())
    }

    fn post_json(
        &self,
        request: &HttpRequest<'_>,
        body: &Value,
    ) -> Result<HttpResponse, ShareError> {
        tracing::debug!(url = request.url, auth = request.token.is_some(), "POST");
        Self::finish(request.url, self.request("POST", request).send_json(body))
    }
}
