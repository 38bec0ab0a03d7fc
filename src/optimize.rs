//! Shrinking transcripts to fit the gist size budget.
//!
//! Messages are processed strictly in transcript order: deduplicated, their
//! tool inputs trimmed, noise dropped, and finally a single trailing cut is
//! made once the running JSONL size would exceed the budget.
//!
//! The dedup key is the role plus the first characters of the message text.
//! Two distinct messages that share a long common prefix (two large pastes of
//! the same boilerplate, say) collide and the later one is dropped.

use serde_json::{Map, Value};
use std::collections::HashSet;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::codec;
use crate::transcript::{Body, Message, Part, Role, Transcript, TruncationRecord};

/// Stays under the ~1MB gist ceiling with margin.
pub const GIST_BUDGET_BYTES: usize = 900_000;

/// Placed where the middle of a long string or array was removed.
pub const TRUNCATION_MARKER: &str = "...[truncated]...";

pub const IMAGE_PLACEHOLDER: &str = "[Image attached]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub budget_bytes: usize,
    pub dedup_prefix_chars: usize,
    pub max_string_chars: usize,
    pub string_head_chars: usize,
    pub string_tail_chars: usize,
    pub max_array_len: usize,
    pub array_head: usize,
    pub array_tail: usize,
    /// User messages this short (after trimming) are noise.
    pub min_user_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            budget_bytes: GIST_BUDGET_BYTES,
            dedup_prefix_chars: 100,
            max_string_chars: 500,
            string_head_chars: 250,
            string_tail_chars: 100,
            max_array_len: 10,
            array_head: 5,
            array_tail: 2,
            min_user_chars: 3,
        }
    }
}

impl Limits {
    pub fn with_budget(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            ..Self::default()
        }
    }
}

/// Inputs to a JSONL share that are not part of the transcript itself.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub shared_at: String,
    pub limits: Limits,
}

impl EncodeOptions {
    pub fn new(shared_at: impl Into<String>, limits: Limits) -> Self {
        Self {
            shared_at: shared_at.into(),
            limits,
        }
    }

    /// Stamp with the current time, to the second.
    pub fn now(limits: Limits) -> Self {
        let now = OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        Self::new(now.format(&Rfc3339).unwrap_or_default(), limits)
    }
}

/// Produce a transcript whose JSONL encoding fits `options.limits.budget_bytes`.
///
/// Never fails. The output carries an explicit summary and timestamp so a
/// second pass sees the same header, and a truncation record whenever this or
/// an earlier pass cut messages. The budget is honoured as long as it can hold
/// the header and trailer lines.
pub fn optimize(transcript: &Transcript, options: &EncodeOptions) -> Transcript {
    let limits = &options.limits;
    let mut out = Transcript {
        id: transcript.id.clone(),
        summary: Some(transcript.title()),
        project: transcript.project.clone(),
        timestamp: transcript.session_timestamp(),
        shared_at: transcript.shared_at.clone(),
        messages: Vec::new(),
        truncation: None,
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for message in &transcript.messages {
        let shrunk = shrink_message(message, limits);
        if !seen.insert(content_key(&shrunk, limits)) {
            continue;
        }
        if is_meaningful(&shrunk, limits) {
            candidates.push(shrunk);
        }
    }

    let candidate_count = candidates.len();
    let mut used = codec::header_line(&out, &options.shared_at).len() + 1;
    let mut sizes = Vec::with_capacity(candidate_count);
    let mut cut = false;
    for message in candidates {
        let size = codec::message_line(&message).len() + 1;
        if used + size > limits.budget_bytes {
            cut = true;
            break;
        }
        used += size;
        sizes.push(size);
        out.messages.push(message);
    }

    let total_messages = transcript
        .truncation
        .map(|r| r.total_messages)
        .unwrap_or(transcript.messages.len());
    if cut || transcript.truncation.is_some() {
        loop {
            let record = TruncationRecord {
                total_messages,
                included_messages: out.messages.len(),
            };
            let trailer = codec::truncation_line(&record, &options.shared_at).len() + 1;
            if used + trailer <= limits.budget_bytes || out.messages.is_empty() {
                out.truncation = Some(record);
                break;
            }
            out.messages.pop();
            used -= sizes.pop().unwrap_or(0);
            cut = true;
        }
    }
    if cut {
        tracing::warn!(
            included = out.messages.len(),
            total = total_messages,
            candidates = candidate_count,
            budget = limits.budget_bytes,
            "share truncated to fit size budget"
        );
    }

    out
}

/// Dedup key: role plus the leading characters of the displayed text.
pub fn content_key(message: &Message, limits: &Limits) -> String {
    let text: String = message
        .body
        .display_text()
        .chars()
        .take(limits.dedup_prefix_chars)
        .collect();
    format!("{}:{}", message.role.as_str(), text)
}

fn is_meaningful(message: &Message, limits: &Limits) -> bool {
    let text = message.body.display_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    match message.role {
        Role::User => trimmed.chars().count() > limits.min_user_chars,
        Role::Assistant => true,
    }
}

fn shrink_message(message: &Message, limits: &Limits) -> Message {
    let body = match &message.body {
        Body::Plain(text) => Body::Plain(text.clone()),
        Body::Parts(parts) => Body::Parts(
            parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => Part::Text { text: text.clone() },
                    Part::ToolInvocation { name, input } => Part::ToolInvocation {
                        name: name.clone(),
                        input: minimize_tool_input(input, limits),
                    },
                    Part::Image { summary } => Part::Image {
                        summary: Some(
                            summary.clone().unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()),
                        ),
                    },
                })
                .collect(),
        ),
    };
    Message::new(message.role, message.timestamp.clone(), body)
}

/// Trim the top-level fields of a tool input: long strings keep their head
/// and tail, long arrays keep their first and last few elements.
pub fn minimize_tool_input(input: &Value, limits: &Limits) -> Value {
    let Value::Object(fields) = input else {
        return input.clone();
    };
    let mut minimized = Map::with_capacity(fields.len());
    for (key, value) in fields {
        let value = match value {
            Value::String(text) if text.chars().count() > limits.max_string_chars => {
                Value::String(shorten_middle(text, limits))
            }
            Value::Array(items) if items.len() > limits.max_array_len => {
                let mut kept = Vec::with_capacity(limits.array_head + limits.array_tail + 1);
                kept.extend(items.iter().take(limits.array_head).cloned());
                kept.push(Value::String(TRUNCATION_MARKER.to_string()));
                kept.extend(items.iter().skip(items.len() - limits.array_tail).cloned());
                Value::Array(kept)
            }
            other => other.clone(),
        };
        minimized.insert(key.clone(), value);
    }
    Value::Object(minimized)
}

fn shorten_middle(text: &str, limits: &Limits) -> String {
    let count = text.chars().count();
    let head: String = text.chars().take(limits.string_head_chars).collect();
    let tail: String = text
        .chars()
        .skip(count.saturating_sub(limits.string_tail_chars))
        .collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(budget: usize) -> EncodeOptions {
        EncodeOptions::new("2025-01-04T10:30:00Z", Limits::with_budget(budget))
    }

    fn tool_message(input: Value) -> Message {
        Message::new(
            Role::Assistant,
            None,
            Body::Parts(vec![Part::ToolInvocation {
                name: "Write".to_string(),
                input,
            }]),
        )
    }

    #[test]
    fn drops_duplicate_messages() {
        let transcript = Transcript::new(
            "s",
            vec![
                Message::text(Role::User, "please run the tests"),
                Message::text(Role::User, "please run the tests"),
                Message::text(Role::Assistant, "please run the tests"),
            ],
        );
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(out.messages[1].role, Role::Assistant);
        assert!(out.truncation.is_none());
    }

    #[test]
    fn shared_prefix_collides() {
        let boilerplate = "x".repeat(120);
        let transcript = Transcript::new(
            "s",
            vec![
                Message::text(Role::User, format!("{boilerplate} first")),
                Message::text(Role::User, format!("{boilerplate} second")),
            ],
        );
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn drops_noise() {
        let transcript = Transcript::new(
            "s",
            vec![
                Message::text(Role::User, " ok "),
                Message::text(Role::Assistant, "   "),
                Message::text(Role::User, "yes please"),
                Message::new(Role::User, None, Body::Parts(Vec::new())),
            ],
        );
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert_eq!(out.messages, vec![Message::text(Role::User, "yes please")]);
    }

    #[test]
    fn keeps_tool_only_assistant_messages() {
        let transcript = Transcript::new(
            "s",
            vec![
                tool_message(json!({"command": "ls"})),
                tool_message(json!({"command": "pwd"})),
            ],
        );
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert_eq!(out.messages.len(), 2);
    }

    #[test]
    fn minimizes_long_strings() {
        let content = format!("{}{}{}", "a".repeat(250), "b".repeat(300), "c".repeat(100));
        let input = json!({"content": content, "path": "/x"});
        let minimized = minimize_tool_input(&input, &Limits::default());
        let shortened = minimized["content"].as_str().unwrap();
        assert_eq!(
            shortened,
            format!("{}{}{}", "a".repeat(250), TRUNCATION_MARKER, "c".repeat(100))
        );
        assert_eq!(minimized["path"], "/x");
    }

    #[test]
    fn minimizes_long_arrays() {
        let items: Vec<i32> = (1..=12).collect();
        let minimized = minimize_tool_input(&json!({"files": items}), &Limits::default());
        assert_eq!(
            minimized["files"],
            json!([1, 2, 3, 4, 5, TRUNCATION_MARKER, 11, 12])
        );
    }

    #[test]
    fn leaves_short_inputs_alone() {
        let input = json!({"command": "cargo fmt", "args": [1, 2, 3]});
        assert_eq!(minimize_tool_input(&input, &Limits::default()), input);
        assert_eq!(minimize_tool_input(&json!("raw"), &Limits::default()), json!("raw"));
    }

    #[test]
    fn image_gets_placeholder() {
        let transcript = Transcript::new(
            "s",
            vec![Message::new(
                Role::User,
                None,
                Body::Parts(vec![Part::Image { summary: None }]),
            )],
        );
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert_eq!(
            out.messages[0].body,
            Body::Parts(vec![Part::Image {
                summary: Some(IMAGE_PLACEHOLDER.to_string())
            }])
        );
    }

    #[test]
    fn budget_cut_is_a_single_trailing_cut() {
        let messages: Vec<Message> = (0..50)
            .map(|i| Message::text(Role::User, format!("message number {i} {}", "z".repeat(80))))
            .collect();
        let transcript = Transcript::new("s", messages.clone());
        let opts = options(2_000);
        let out = optimize(&transcript, &opts);

        let record = out.truncation.expect("truncated");
        assert_eq!(record.total_messages, 50);
        assert_eq!(record.included_messages, out.messages.len());
        assert!(!out.messages.is_empty());
        assert_eq!(out.messages[..], messages[..out.messages.len()]);
        assert!(codec::write_jsonl(&out, &opts.shared_at).len() <= 2_000);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let messages: Vec<Message> = (0..40)
            .map(|i| Message::text(Role::Assistant, format!("reply {i} {}", "q".repeat(90))))
            .collect();
        let mut transcript = Transcript::new("s", messages);
        transcript.messages.push(Message::text(Role::Assistant, "reply 0 dup"));
        let opts = options(3_000);
        let once = optimize(&transcript, &opts);
        let twice = optimize(&once, &opts);
        assert_eq!(once, twice);
    }

    #[test]
    fn untouched_transcript_has_no_trailer() {
        let transcript = Transcript::new("s", vec![Message::text(Role::User, "hello world")]);
        let out = optimize(&transcript, &options(GIST_BUDGET_BYTES));
        assert!(out.truncation.is_none());
        assert_eq!(out.summary.as_deref(), Some("hello world"));
    }
}
