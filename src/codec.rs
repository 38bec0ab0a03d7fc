//! Wire formats for shared sessions.
//!
//! Three shapes exist: the legacy blob (base64 JSON carried in a
//! `#session=` link), the older plain blob (`#shared=`), and the JSONL
//! stream stored in a gist: a `session_info` header, one line per message
//! and an optional `truncation_info` trailer.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

use crate::error::ShareError;
use crate::optimize::{EncodeOptions, optimize};
use crate::transcript::{Message, Transcript, TruncationRecord, truncate};

/// Version written into JSONL headers.
pub const FORMAT_VERSION: &str = "1.1";
pub const SHARED_BY: &str = "sessionshare";

pub const LEGACY_MAX_MESSAGES: usize = 10;
pub const LEGACY_MAX_TEXT_CHARS: usize = 500;

pub const HEADER_TYPE: &str = "session_info";
pub const TRUNCATION_TYPE: &str = "truncation_info";
const TRUNCATION_TYPE_OLD: &str = "truncation_notice";

static BASE64_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").unwrap());

/// Accepts missing padding and stray trailing bits, both common in
/// hand-copied links.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

type TextDecoder = fn(&[u8]) -> Option<String>;

/// Historical interpretations of the decoded blob bytes, in the order they
/// are tried. The first that yields parseable JSON wins.
const LEGACY_DECODERS: &[(&str, TextDecoder)] = &[
    ("percent-escaped", percent_escaped_text),
    ("utf-8", utf8_text),
    ("latin-1", latin1_text),
];

fn percent_escaped_text(bytes: &[u8]) -> Option<String> {
    if bytes.first() != Some(&b'%') {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    urlencoding::decode(text).ok().map(|s| s.into_owned())
}

fn utf8_text(bytes: &[u8]) -> Option<String> {
    String::from_utf8(bytes.to_vec()).ok()
}

fn latin1_text(bytes: &[u8]) -> Option<String> {
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

// ===== legacy blob =====

/// Encode the first ten messages as `{title,time,id,msgs}` JSON, base64 of
/// its UTF-8 bytes. Text longer than 500 characters is cut with "...".
pub fn encode_legacy_blob(transcript: &Transcript) -> String {
    let msgs: Vec<Value> = transcript
        .messages
        .iter()
        .take(LEGACY_MAX_MESSAGES)
        .map(|m| {
            json!({
                "type": m.role.as_str(),
                "content": truncate(&m.body.text(), LEGACY_MAX_TEXT_CHARS),
            })
        })
        .collect();
    let document = json!({
        "title": transcript.title(),
        "time": transcript.session_timestamp(),
        "id": transcript.id,
        "msgs": msgs,
    });
    STANDARD.encode(document.to_string())
}

/// Decode a `#session=` blob, tolerating every encoding seen in old links.
///
/// Text outside the base64 alphabet is percent-decoded first. The result is
/// either a percent-wrapped base64 blob or the JSON document itself.
pub fn decode_legacy_blob(blob: &str) -> Result<Transcript, ShareError> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    if BASE64_TEXT.is_match(&compact) {
        return decode_base64_blob(&compact);
    }
    let unescaped = urlencoding::decode(&compact)
        .map_err(|e| ShareError::Decode(format!("not base64 and not percent-encoded: {e}")))?
        .into_owned();
    let wrapped: String = unescaped.chars().filter(|c| !c.is_whitespace()).collect();
    if BASE64_TEXT.is_match(&wrapped) {
        return decode_base64_blob(&wrapped);
    }
    let document: Value = serde_json::from_str(&unescaped)
        .map_err(|e| ShareError::Decode(format!("percent-encoded JSON: {e}")))?;
    tracing::debug!(decoder = "percent-encoded JSON", "decoded legacy blob");
    transcript_from_blob(&document)
}

fn decode_base64_blob(compact: &str) -> Result<Transcript, ShareError> {
    let bytes = LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| ShareError::Decode(format!("invalid base64: {e}")))?;

    let mut last_error = String::from("no decoder applied");
    for (name, decoder) in LEGACY_DECODERS {
        let Some(text) = decoder(&bytes) else {
            continue;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(document) => {
                tracing::debug!(decoder = name, "decoded legacy blob");
                return transcript_from_blob(&document);
            }
            Err(err) => last_error = format!("{name}: {err}"),
        }
    }
    Err(ShareError::Decode(last_error))
}

/// Decode a deprecated `#shared=` blob: base64 whose bytes are read one
/// character each, with no Unicode remapping.
pub fn decode_plain_blob(blob: &str) -> Result<Transcript, ShareError> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| ShareError::Decode(format!("invalid base64: {e}")))?;
    let text = latin1_text(&bytes).unwrap_or_default();
    let document: Value =
        serde_json::from_str(&text).map_err(|e| ShareError::Decode(e.to_string()))?;
    transcript_from_blob(&document)
}

fn transcript_from_blob(document: &Value) -> Result<Transcript, ShareError> {
    let Value::Object(fields) = document else {
        return Err(ShareError::Decode(
            "shared session is not a JSON object".to_string(),
        ));
    };
    let text_field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
    let messages = fields
        .get("msgs")
        .or_else(|| fields.get("messages"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Message::from_record).collect())
        .unwrap_or_default();

    let mut transcript = Transcript::new(text_field("id").unwrap_or_default(), messages);
    transcript.summary = text_field("title");
    transcript.timestamp = text_field("time");
    Ok(transcript)
}

// ===== JSONL =====

/// Optimize a transcript for the configured budget and write it as JSONL.
pub fn encode_jsonl(transcript: &Transcript, options: &EncodeOptions) -> String {
    write_jsonl(&optimize(transcript, options), &options.shared_at)
}

/// Write a transcript as JSONL as-is. Every line, the last included, ends
/// with a newline.
pub fn write_jsonl(transcript: &Transcript, shared_at: &str) -> String {
    let mut out = header_line(transcript, shared_at);
    out.push('\n');
    for message in &transcript.messages {
        out.push_str(&message_line(message));
        out.push('\n');
    }
    if let Some(record) = &transcript.truncation {
        out.push_str(&truncation_line(record, shared_at));
        out.push('\n');
    }
    out
}

pub fn header_line(transcript: &Transcript, shared_at: &str) -> String {
    json!({
        "type": HEADER_TYPE,
        "id": transcript.id,
        "summary": transcript.summary.clone().unwrap_or_else(|| transcript.title()),
        "timestamp": transcript.session_timestamp(),
        "projectName": transcript.project,
        "sharedAt": shared_at,
        "version": FORMAT_VERSION,
        "sharedBy": SHARED_BY,
    })
    .to_string()
}

/// Compact message line: `{type, ts, msg: {content}}`.
pub fn message_line(message: &Message) -> String {
    let mut line = Map::new();
    line.insert("type".to_string(), Value::from(message.role.as_str()));
    if let Some(ts) = &message.timestamp {
        line.insert("ts".to_string(), Value::from(ts.as_str()));
    }
    line.insert("msg".to_string(), json!({ "content": message.body.to_value() }));
    Value::Object(line).to_string()
}

pub fn truncation_line(record: &TruncationRecord, shared_at: &str) -> String {
    json!({
        "type": TRUNCATION_TYPE,
        "message": record.notice(),
        "totalMessages": record.total_messages,
        "includedMessages": record.included_messages,
        "truncatedAt": shared_at,
    })
    .to_string()
}

/// Decode a JSONL share. Lines that are not JSON objects are skipped, as
/// are records of roles other than user and assistant. Fails only when no
/// line holds a JSON record.
pub fn decode_jsonl(content: &str) -> Result<Transcript, ShareError> {
    let mut transcript = Transcript::default();
    let mut records = 0usize;
    let mut skipped = 0usize;

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                skipped += 1;
                continue;
            }
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "skipping unparseable JSONL line");
                skipped += 1;
                continue;
            }
        };
        records += 1;

        match record.get("type").and_then(Value::as_str) {
            Some(HEADER_TYPE) => apply_header(&mut transcript, &record),
            Some(TRUNCATION_TYPE) | Some(TRUNCATION_TYPE_OLD) => {
                transcript.truncation = truncation_from_record(&record);
            }
            _ => {
                if let Some(message) = Message::from_record(&record) {
                    transcript.messages.push(message);
                }
            }
        }
    }

    if records == 0 {
        return Err(ShareError::Decode(format!(
            "no JSON records found ({skipped} unparseable lines)"
        )));
    }
    Ok(transcript)
}

fn apply_header(transcript: &mut Transcript, record: &Value) {
    let text = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_string);
    if let Some(id) = text("id") {
        transcript.id = id;
    }
    transcript.summary = text("summary");
    transcript.timestamp = text("timestamp");
    transcript.project = text("projectName");
    transcript.shared_at = text("sharedAt");
}

fn truncation_from_record(record: &Value) -> Option<TruncationRecord> {
    let count = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|key| record.get(*key).and_then(Value::as_u64))
            .map(|n| n as usize)
    };
    // truncation_notice trailers spell the counts originalCount/includedCount
    let total_messages = count(["totalMessages", "originalCount"])?;
    let included_messages = count(["includedMessages", "includedCount"])?;
    Some(TruncationRecord {
        total_messages,
        included_messages,
    })
}
