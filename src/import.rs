//! Import orchestration: links, gist locators and pasted content to views.

use anyhow::Result;

use crate::codec::{decode_jsonl, decode_legacy_blob, decode_plain_blob};
use crate::detect::{Format, detect, looks_like_session_jsonl};
use crate::error::ShareError;
use crate::host::ContentHost;
use crate::locator::ShareLink;
use crate::render::render_markdown;
use crate::resolver::{Fetched, Resolver, Strategy};
use crate::transcript::{Transcript, UNTITLED};

pub const PASTED_TITLE: &str = "Pasted session";

/// What the presentation layer shows.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Transcript(Transcript),
    /// Legacy markdown exports, shown verbatim.
    Preformatted { title: String, text: String },
}

impl View {
    pub fn render(&self) -> String {
        match self {
            View::Transcript(transcript) => render_markdown(transcript),
            View::Preformatted { text, .. } => text.clone(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            View::Transcript(transcript) => transcript.title(),
            View::Preformatted { title, .. } => title.clone(),
        }
    }
}

pub fn view_from_fetched(fetched: &Fetched) -> Result<View> {
    match fetched.format {
        Format::Jsonl => {
            let mut transcript = decode_jsonl(&fetched.content)?;
            if transcript.summary.is_none() && transcript.title() == UNTITLED {
                transcript.summary = Some(fetched.title.clone());
            }
            if transcript.id.is_empty() {
                transcript.id = fetched.id.clone();
            }
            Ok(View::Transcript(transcript))
        }
        Format::Markdown => Ok(View::Preformatted {
            title: fetched.title.clone(),
            text: fetched.content.clone(),
        }),
        Format::Unrecognized => Err(ShareError::Decode(format!(
            "content from {} is neither a JSONL session nor markdown",
            fetched.page_url
        ))
        .into()),
    }
}

/// Wrap pasted text as fetched content. Pasted text counts as JSONL when
/// any line is a session record.
pub fn fetched_from_paste(content: &str) -> Fetched {
    let format = if looks_like_session_jsonl(content) {
        Format::Jsonl
    } else {
        detect(content)
    };
    Fetched {
        id: String::new(),
        title: PASTED_TITLE.to_string(),
        content: content.to_string(),
        page_url: "(pasted)".to_string(),
        created_at: None,
        updated_at: None,
        source: Strategy::Manual,
        format,
    }
}

pub fn view_from_pasted(content: &str) -> Result<View> {
    if content.trim().is_empty() {
        return Err(ShareError::Decode("nothing was pasted".to_string()).into());
    }
    view_from_fetched(&fetched_from_paste(content))
}

/// Resolve a gist locator. The error is a `ResolveError` carrying the
/// manual recovery steps.
pub fn import_locator<H: ContentHost>(
    locator: &str,
    resolver: &Resolver<H>,
) -> Result<(Fetched, View)> {
    let fetched = resolver.resolve(locator)?;
    let view = view_from_fetched(&fetched)?;
    Ok((fetched, view))
}

/// Open a viewer link: inline sessions decode locally, `#import=` links
/// and bare gist locators go through the resolver.
pub fn open_link<H: ContentHost>(url: &str, resolver: &Resolver<H>) -> Result<View> {
    match ShareLink::parse(url) {
        Some(ShareLink::Session(blob)) | Some(ShareLink::LegacySessionQuery(blob)) => {
            Ok(View::Transcript(decode_legacy_blob(&blob)?))
        }
        Some(ShareLink::Shared(blob)) => Ok(View::Transcript(decode_plain_blob(&blob)?)),
        Some(ShareLink::Import(locator)) => Ok(import_locator(&locator, resolver)?.1),
        None => Ok(import_locator(url, resolver)?.1),
    }
}
