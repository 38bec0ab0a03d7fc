//! Transcript handling: discovery, parsing, and types.

mod discovery;
mod parser;
mod types;

pub use discovery::{SessionEntry, claude_projects_dir, list_sessions};
pub use parser::{parse_transcript, parse_transcript_str};
pub use types::{
    Body, Message, Part, Role, Transcript, TruncationRecord, UNTITLED, looks_like_internal_block,
    project_label, truncate,
};
