//! Share coding-assistant sessions as links or gists, and import them back.
//!
//! The core is pure: [`codec`] translates transcripts to and from the wire
//! formats, [`optimize`] fits them into the gist budget, [`detect`]
//! classifies fetched text and [`resolver`] turns a locator into content
//! through a [`host::ContentHost`].

pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod host;
pub mod import;
pub mod locator;
pub mod optimize;
pub mod render;
pub mod resolver;
pub mod share;
pub mod transcript;

#[cfg(test)]
mod test_utils;

pub use codec::{
    decode_jsonl, decode_legacy_blob, decode_plain_blob, encode_jsonl, encode_legacy_blob,
    write_jsonl,
};
pub use config::{Config, Language};
pub use detect::{Format, detect};
pub use error::ShareError;
pub use host::{ContentHost, Hosts, UreqHost};
pub use import::{View, open_link, view_from_pasted};
pub use locator::{ShareLink, extract_gist_id};
pub use optimize::{EncodeOptions, GIST_BUDGET_BYTES, Limits, optimize};
pub use resolver::{Fetched, ResolveError, Resolver, Strategy};
pub use share::{ShareMode, ShareOptions, ShareOutcome, share};
pub use transcript::{Message, Transcript};
