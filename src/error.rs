//! Error taxonomy shared by the codec, resolver and import flows.

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ShareError {
    /// The locator matched none of the accepted gist URL or ID shapes.
    #[error("invalid gist URL or ID: {0:?}")]
    InvalidLocator(String),

    /// The gist API refused the request because the rate limit was hit.
    #[error("GitHub API rate limit exceeded{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<OffsetDateTime> },

    /// The gist exists but none of its files looks like a session.
    #[error("no session file found in gist {0}")]
    NoSessionFile(String),

    /// Every decode fallback was exhausted.
    #[error("failed to decode shared session: {0}")]
    Decode(String),

    /// Transport-level failure (DNS, refused connection, timeout).
    #[error("network failure: {0}")]
    Network(String),

    /// A well-formed HTTP response that was not a success.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A success response whose body could not be used.
    #[error("{url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("no GitHub token configured")]
    MissingCredential,

    /// The user cancelled a prompt. Never shown.
    #[error("cancelled")]
    UserAborted,
}

impl ShareError {
    /// True when the error must not produce any user-visible output.
    pub fn is_silent(&self) -> bool {
        matches!(self, ShareError::UserAborted)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ShareError::RateLimited { .. })
    }
}

fn reset_hint(reset_at: &Option<OffsetDateTime>) -> String {
    match reset_at.and_then(|at| at.format(&Rfc3339).ok()) {
        Some(at) => format!(" (resets at {at})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_mentions_reset_time() {
        let reset_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let err = ShareError::RateLimited {
            reset_at: Some(reset_at),
        };
        assert_eq!(
            err.to_string(),
            "GitHub API rate limit exceeded (resets at 2023-11-14T22:13:20Z)"
        );
    }

    #[test]
    fn rate_limited_without_hint() {
        let err = ShareError::RateLimited { reset_at: None };
        assert_eq!(err.to_string(), "GitHub API rate limit exceeded");
        assert!(err.is_rate_limited());
    }

    #[test]
    fn only_user_abort_is_silent() {
        assert!(ShareError::UserAborted.is_silent());
        assert!(!ShareError::Network("timed out".to_string()).is_silent());
        assert!(!ShareError::Decode("bad".to_string()).is_silent());
    }
}
