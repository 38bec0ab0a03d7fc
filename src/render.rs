//! Rendering: transcripts as markdown, timestamps as relative times.

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::config::Language;
use crate::transcript::{Body, Message, Part, Role, Transcript};

/// Render a transcript as a markdown document.
pub fn render_markdown(transcript: &Transcript) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", transcript.title()));

    let mut meta_parts = Vec::new();
    if transcript.project.is_some() {
        meta_parts.push(transcript.project_label());
    }
    if let Some(ts) = transcript.session_timestamp() {
        meta_parts.push(ts);
    }
    meta_parts.push(format!("{} messages", transcript.messages.len()));
    if let Some(shared_at) = &transcript.shared_at {
        meta_parts.push(format!("shared {shared_at}"));
    }
    md.push_str(&format!("*{}*\n\n", meta_parts.join(" · ")));
    if !transcript.id.is_empty() {
        md.push_str(&format!("Session ID: `{}`\n\n", transcript.id));
    }

    md.push_str("---\n\n");

    for message in &transcript.messages {
        render_message(&mut md, message);
    }

    if let Some(record) = &transcript.truncation {
        md.push_str("---\n\n");
        md.push_str(&format!("> {}\n", record.notice()));
    }

    md
}

fn render_message(md: &mut String, message: &Message) {
    let role_display = match message.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    };
    let time_suffix = message
        .timestamp
        .as_deref()
        .map(|ts| format!(" ({ts})"))
        .unwrap_or_default();
    md.push_str(&format!("### {role_display}{time_suffix}\n\n"));

    match &message.body {
        Body::Plain(text) => push_block(md, text),
        Body::Parts(parts) => {
            for part in parts {
                match part {
                    Part::Text { text } => push_block(md, text),
                    Part::ToolInvocation { name, input } => {
                        let pretty = serde_json::to_string_pretty(input)
                            .unwrap_or_else(|_| input.to_string());
                        md.push_str(&format!(
                            "<details>\n<summary>Tool: {name}</summary>\n\n\
                             ```json\n{pretty}\n```\n\n</details>\n\n"
                        ));
                    }
                    Part::Image { summary } => {
                        let summary = summary.as_deref().unwrap_or("[Image]");
                        md.push_str(&format!("*{summary}*\n\n"));
                    }
                }
            }
        }
    }
}

fn push_block(md: &mut String, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    md.push_str(text);
    if !text.ends_with('\n') {
        md.push('\n');
    }
    md.push('\n');
}

/// Relative time such as "5 minutes ago". Missing or unparseable
/// timestamps read as "unknown time"; future ones as "just now".
pub fn format_time_ago(timestamp: Option<&str>, now: OffsetDateTime, language: Language) -> String {
    let Some(then) = timestamp.and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok()) else {
        return match language {
            Language::En => "unknown time".to_string(),
            Language::Zh => "未知时间".to_string(),
        };
    };
    let elapsed = now - then;
    if elapsed < Duration::minutes(1) {
        return match language {
            Language::En => "just now".to_string(),
            Language::Zh => "刚刚".to_string(),
        };
    }
    let (n, unit) = if elapsed < Duration::hours(1) {
        (elapsed.whole_minutes(), Unit::Minutes)
    } else if elapsed < Duration::days(1) {
        (elapsed.whole_hours(), Unit::Hours)
    } else {
        (elapsed.whole_days(), Unit::Days)
    };
    match (language, unit) {
        (Language::En, Unit::Minutes) => format!("{n} minutes ago"),
        (Language::En, Unit::Hours) => format!("{n} hours ago"),
        (Language::En, Unit::Days) => format!("{n} days ago"),
        (Language::Zh, Unit::Minutes) => format!("{n}分钟前"),
        (Language::Zh, Unit::Hours) => format!("{n}小时前"),
        (Language::Zh, Unit::Days) => format!("{n}天前"),
    }
}

enum Unit {
    Minutes,
    Hours,
    Days,
}
