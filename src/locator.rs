//! Locators and share links.
//!
//! A locator names a gist: a full URL with or without the owner segment, or
//! a bare hex ID. A share link is a viewer URL carrying a session inline or
//! pointing at a gist to import.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ShareError;

static WITH_OWNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?[^/\s?#]+/[^/\s?#]+/([0-9a-fA-F]+)(?:[/?#]\S*)?$").unwrap()
});
static WITHOUT_OWNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?[^/\s?#]+/([0-9a-fA-F]+)(?:[/?#]\S*)?$").unwrap()
});
static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]+)$").unwrap());

/// Normalize a locator to its gist ID.
pub fn extract_gist_id(locator: &str) -> Result<String, ShareError> {
    let trimmed = locator.trim();
    [&*WITH_OWNER, &*WITHOUT_OWNER, &*BARE_ID]
        .iter()
        .find_map(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ShareError::InvalidLocator(locator.to_string()))
}

/// A session carried by a viewer URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareLink {
    /// `#session=<legacy blob>`
    Session(String),
    /// `?session=<legacy blob>`, deprecated.
    LegacySessionQuery(String),
    /// `#import=<locator>`
    Import(String),
    /// `#shared=<plain base64>`, deprecated.
    Shared(String),
}

impl ShareLink {
    /// Find the share parameter in a URL. When several are present the
    /// fragment session wins, then the query session, then an import, then
    /// the deprecated shared blob.
    pub fn parse(url: &str) -> Option<ShareLink> {
        let (before_fragment, fragment) = match url.split_once('#') {
            Some((head, fragment)) => (head, Some(fragment)),
            None => (url, None),
        };
        let query = before_fragment.split_once('?').map(|(_, q)| q);

        if let Some(blob) = fragment.and_then(|f| param(f, "session")) {
            return Some(ShareLink::Session(blob.to_string()));
        }
        if let Some(blob) = query.and_then(|q| param(q, "session")) {
            return Some(ShareLink::LegacySessionQuery(percent_decoded(blob)));
        }
        if let Some(locator) = fragment.and_then(|f| param(f, "import")) {
            return Some(ShareLink::Import(percent_decoded(locator)));
        }
        fragment
            .and_then(|f| param(f, "shared"))
            .map(|blob| ShareLink::Shared(blob.to_string()))
    }
}

/// `<viewer>#session=<blob>`
pub fn session_link(viewer_url: &str, blob: &str) -> String {
    format!("{}#session={blob}", viewer_url.trim_end_matches('#'))
}

/// `<viewer>#import=<percent-encoded gist url>`
pub fn import_link(viewer_url: &str, gist_url: &str) -> String {
    format!(
        "{}#import={}",
        viewer_url.trim_end_matches('#'),
        urlencoding::encode(gist_url)
    )
}

fn param<'a>(params: &'a str, name: &str) -> Option<&'a str> {
    params.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

fn percent_decoded(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== gist id tests =====

    #[test]
    fn id_from_url_with_owner() {
        assert_eq!(
            extract_gist_id("https://gist.example.com/alice/abc123").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn id_from_url_without_owner() {
        assert_eq!(
            extract_gist_id("https://gist.example.com/abc123").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn id_from_bare_hex() {
        assert_eq!(extract_gist_id("abc123").unwrap(), "abc123");
        assert_eq!(extract_gist_id("  DEADbeef0 \n").unwrap(), "DEADbeef0");
    }

    #[test]
    fn id_with_trailing_path_or_fragment() {
        assert_eq!(
            extract_gist_id("https://gist.github.com/bob/0f1e2d/raw/claude-session.jsonl").unwrap(),
            "0f1e2d"
        );
        assert_eq!(
            extract_gist_id("gist.github.com/0f1e2d#file-session").unwrap(),
            "0f1e2d"
        );
        assert_eq!(
            extract_gist_id("https://gist.github.com/0f1e2d/raw").unwrap(),
            "0f1e2d"
        );
    }

    #[test]
    fn invalid_locators() {
        for locator in ["not a valid url at all", "", "xyz", "https://gist.github.com/alice/"] {
            assert_eq!(
                extract_gist_id(locator),
                Err(ShareError::InvalidLocator(locator.to_string()))
            );
        }
    }

    // ===== share link tests =====

    #[test]
    fn parses_session_fragment() {
        assert_eq!(
            ShareLink::parse("https://viewer.example/#session=eyJhIjoxfQ=="),
            Some(ShareLink::Session("eyJhIjoxfQ==".to_string()))
        );
    }

    #[test]
    fn fragment_session_beats_query_session() {
        assert_eq!(
            ShareLink::parse("https://viewer.example/?session=old#session=new"),
            Some(ShareLink::Session("new".to_string()))
        );
        assert_eq!(
            ShareLink::parse("https://viewer.example/?session=ab%2Bc#import=x"),
            Some(ShareLink::LegacySessionQuery("ab+c".to_string()))
        );
    }

    #[test]
    fn parses_import_fragment() {
        let link = import_link(
            "https://viewer.example/",
            "https://gist.github.com/alice/abc123",
        );
        assert_eq!(
            link,
            "https://viewer.example/#import=https%3A%2F%2Fgist.github.com%2Falice%2Fabc123"
        );
        assert_eq!(
            ShareLink::parse(&link),
            Some(ShareLink::Import("https://gist.github.com/alice/abc123".to_string()))
        );
    }

    #[test]
    fn parses_shared_fragment_last() {
        assert_eq!(
            ShareLink::parse("https://viewer.example/#shared=e30="),
            Some(ShareLink::Shared("e30=".to_string()))
        );
        assert_eq!(ShareLink::parse("https://viewer.example/"), None);
        assert_eq!(ShareLink::parse("https://viewer.example/#session="), None);
    }

    #[test]
    fn session_link_format() {
        assert_eq!(
            session_link("https://viewer.example/", "e30="),
            "https://viewer.example/#session=e30="
        );
    }
}
