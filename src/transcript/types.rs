//! Types for transcripts and their messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Fallback title when a transcript has neither a summary nor a user message.
pub const UNTITLED: &str = "Untitled";

const TITLE_MAX_CHARS: usize = 100;
const PROJECT_LABEL_MAX_CHARS: usize = 50;

/// Who wrote a message. Anything else in a transcript is not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One element of a structured message body.
///
/// Image payloads are never carried; only a human-readable summary survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use", alias = "tool_invocation")]
    ToolInvocation {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "image")]
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl Part {
    fn display_text(&self) -> String {
        match self {
            Part::Text { text } => text.clone(),
            Part::ToolInvocation { name, input } => {
                if input.is_null() {
                    format!("[Tool: {name}]")
                } else {
                    format!("[Tool: {name}] {input}")
                }
            }
            Part::Image { summary } => summary.clone().unwrap_or_else(|| "[Image]".to_string()),
        }
    }
}

/// A message body: either a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    Plain(String),
    Parts(Vec<Part>),
}

impl Body {
    /// Read a `content` value. Parts of unknown kinds (tool results,
    /// thinking blocks) are skipped.
    pub fn from_value(value: &Value) -> Option<Body> {
        match value {
            Value::String(text) => Some(Body::Plain(text.clone())),
            Value::Array(items) => Some(Body::Parts(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<Part>(item.clone()).ok())
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Body::Plain(text) => Value::String(text.clone()),
            Body::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .filter_map(|part| serde_json::to_value(part).ok())
                    .collect(),
            ),
        }
    }

    /// Only the text parts, joined by newlines.
    pub fn text(&self) -> String {
        match self {
            Body::Plain(text) => text.clone(),
            Body::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Text with placeholders for tool invocations and images.
    pub fn display_text(&self) -> String {
        match self {
            Body::Plain(text) => text.clone(),
            Body::Parts(parts) => parts
                .iter()
                .map(Part::display_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub timestamp: Option<String>,
    pub body: Body,
}

impl Message {
    pub fn new(role: Role, timestamp: Option<String>, body: Body) -> Self {
        Self {
            role,
            timestamp,
            body,
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, None, Body::Plain(text.into()))
    }

    /// Build a message from one transcript record.
    ///
    /// Accepts the full shape (`type`, `timestamp`, `message.content`), the
    /// compact shape (`type`, `ts`, `msg.content`), the legacy blob shape
    /// (`type`, `content`) and `role`/`body` keyed records. Returns `None` for
    /// records whose role is not user or assistant.
    pub fn from_record(record: &Value) -> Option<Message> {
        let role = match record.get("type").and_then(Value::as_str) {
            Some(kind) => Role::parse(kind)?,
            None => record
                .get("role")
                .or_else(|| record.pointer("/message/role"))
                .and_then(Value::as_str)
                .and_then(Role::parse)?,
        };
        let timestamp = record
            .get("ts")
            .or_else(|| record.get("timestamp"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let container = record
            .get("msg")
            .or_else(|| record.get("message"))
            .or_else(|| record.get("body"));
        let content = match container {
            Some(Value::Object(map)) => map.get("content"),
            Some(other) => Some(other),
            None => record.get("content"),
        };
        let body = content
            .and_then(Body::from_value)
            .unwrap_or_else(|| Body::Plain(String::new()));
        Some(Message::new(role, timestamp, body))
    }
}

/// Synthetic trailer recorded when trailing messages were cut to fit a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TruncationRecord {
    pub total_messages: usize,
    pub included_messages: usize,
}

impl TruncationRecord {
    pub fn notice(&self) -> String {
        format!(
            "Note: this share contains {} of {} messages due to size limitations.",
            self.included_messages, self.total_messages
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcript {
    pub id: String,
    pub summary: Option<String>,
    /// Path-like project identifier, dashes standing in for separators.
    pub project: Option<String>,
    /// Explicit session timestamp, when the source carried one.
    pub timestamp: Option<String>,
    /// When the transcript was shared, for decoded payloads.
    pub shared_at: Option<String>,
    pub messages: Vec<Message>,
    pub truncation: Option<TruncationRecord>,
}

impl Transcript {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
            ..Self::default()
        }
    }

    /// Summary, else the first user message, else "Untitled".
    pub fn title(&self) -> String {
        if let Some(summary) = self.summary.as_deref().map(str::trim) {
            if !summary.is_empty() {
                return summary.to_string();
            }
        }
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.body.text())
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty() && !looks_like_internal_block(text))
            .map(|text| truncate(&text, TITLE_MAX_CHARS))
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    pub fn project_label(&self) -> String {
        project_label(self.project.as_deref())
    }

    /// Latest message timestamp, compared as RFC 3339 instants when possible.
    pub fn last_activity(&self) -> Option<String> {
        let mut latest: Option<(&str, Option<OffsetDateTime>)> = None;
        for ts in self.messages.iter().filter_map(|m| m.timestamp.as_deref()) {
            let parsed = OffsetDateTime::parse(ts, &Rfc3339).ok();
            let newer = match latest {
                None => true,
                Some((_, Some(best))) => parsed.is_some_and(|p| p > best),
                Some((best, None)) => parsed.is_some() || ts > best,
            };
            if newer {
                latest = Some((ts, parsed));
            }
        }
        latest.map(|(ts, _)| ts.to_string())
    }

    /// The explicit session timestamp, else the last activity.
    pub fn session_timestamp(&self) -> Option<String> {
        self.timestamp.clone().or_else(|| self.last_activity())
    }
}

/// Display label for a project identifier.
pub fn project_label(project: Option<&str>) -> String {
    let Some(project) = project.filter(|p| !p.trim().is_empty()) else {
        return "Unknown".to_string();
    };
    let label = project.replace('-', "/");
    if label.chars().count() > PROJECT_LABEL_MAX_CHARS {
        let head: String = label.chars().take(PROJECT_LABEL_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        label
    }
}

/// Truncate a string to max_chars, adding "..." if truncated
pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Check if text looks like an injected context block rather than something
/// the user typed.
pub fn looks_like_internal_block(text: &str) -> bool {
    let trimmed = text.trim_start();
    ["<environment_context>", "<INSTRUCTIONS>", "<command-name>", "<local-command-stdout>"]
        .iter()
        .any(|tag| trimmed.starts_with(tag) || trimmed.contains(&format!("\n{tag}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn test_truncate_unicode() {
        // Truncate by character count, not bytes
        assert_eq!(truncate("日本語テスト", 3), "日本語...");
    }

    #[test]
    fn from_record_full_shape() {
        let record = json!({
            "type": "assistant",
            "timestamp": "2025-01-04T10:30:00Z",
            "message": {"content": [
                {"type": "text", "text": "Running it"},
                {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}
            ]}
        });
        let msg = Message::from_record(&record).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.timestamp.as_deref(), Some("2025-01-04T10:30:00Z"));
        assert_eq!(
            msg.body,
            Body::Parts(vec![
                Part::Text {
                    text: "Running it".to_string()
                },
                Part::ToolInvocation {
                    name: "Bash".to_string(),
                    input: json!({"command": "ls"})
                },
            ])
        );
    }

    #[test]
    fn from_record_compact_matches_full() {
        let full = json!({"type": "user", "timestamp": "t1", "message": {"content": "hi there"}});
        let compact = json!({"type": "user", "ts": "t1", "msg": {"content": "hi there"}});
        assert_eq!(Message::from_record(&full), Message::from_record(&compact));
    }

    #[test]
    fn from_record_role_keyed() {
        let record = json!({"role": "user", "body": "plain body"});
        let msg = Message::from_record(&record).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.body, Body::Plain("plain body".to_string()));
    }

    #[test]
    fn from_record_drops_other_roles() {
        assert!(Message::from_record(&json!({"type": "system", "content": "x"})).is_none());
        assert!(Message::from_record(&json!({"type": "summary", "summary": "x"})).is_none());
        assert!(Message::from_record(&json!({"role": "tool", "content": "x"})).is_none());
    }

    #[test]
    fn from_value_skips_unknown_parts_and_image_data() {
        let content = json!([
            {"type": "tool_result", "tool_use_id": "t", "content": "ok"},
            {"type": "image", "source": {"type": "base64", "data": "AAAA"}},
            {"type": "thinking", "thinking": "hmm"}
        ]);
        assert_eq!(
            Body::from_value(&content),
            Some(Body::Parts(vec![Part::Image { summary: None }]))
        );
    }

    #[test]
    fn display_text_includes_placeholders() {
        let body = Body::Parts(vec![
            Part::Text {
                text: "look".to_string(),
            },
            Part::ToolInvocation {
                name: "Read".to_string(),
                input: json!({"file_path": "/a"}),
            },
            Part::Image { summary: None },
        ]);
        assert_eq!(body.text(), "look");
        assert_eq!(
            body.display_text(),
            "look\n[Tool: Read] {\"file_path\":\"/a\"}\n[Image]"
        );
    }

    #[test]
    fn title_falls_back_to_first_user_message() {
        let transcript = Transcript::new(
            "s1",
            vec![
                Message::text(Role::Assistant, "hello"),
                Message::text(Role::User, "<environment_context>cwd</environment_context>"),
                Message::text(Role::User, "  fix the build  "),
            ],
        );
        assert_eq!(transcript.title(), "fix the build");
    }

    #[test]
    fn title_untitled_when_empty() {
        assert_eq!(Transcript::new("s1", Vec::new()).title(), "Untitled");
    }

    #[test]
    fn title_prefers_summary() {
        let mut transcript = Transcript::new("s1", vec![Message::text(Role::User, "question")]);
        transcript.summary = Some("Refactor parser".to_string());
        assert_eq!(transcript.title(), "Refactor parser");
    }

    #[test]
    fn project_label_replaces_dashes() {
        assert_eq!(project_label(Some("-Users-me-code")), "/Users/me/code");
        assert_eq!(project_label(None), "Unknown");
        let long = "-".repeat(60);
        let label = project_label(Some(&long));
        assert_eq!(label.chars().count(), 50);
        assert!(label.ends_with("..."));
    }

    #[test]
    fn last_activity_uses_latest_instant() {
        let mut first = Message::text(Role::User, "a");
        first.timestamp = Some("2025-01-04T10:30:00Z".to_string());
        let mut second = Message::text(Role::Assistant, "b");
        second.timestamp = Some("2025-01-04T12:00:00+01:00".to_string());
        let mut third = Message::text(Role::User, "c");
        third.timestamp = Some("2025-01-04T11:30:00Z".to_string());
        let transcript = Transcript::new("s", vec![first, second, third]);
        assert_eq!(
            transcript.last_activity().as_deref(),
            Some("2025-01-04T11:30:00Z")
        );
    }
}
