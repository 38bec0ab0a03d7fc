//! Property tests for the share encoders and the optimizer.

use proptest::prelude::*;
use serde_json::json;

use sessionshare::codec::{decode_jsonl, decode_legacy_blob, encode_jsonl, encode_legacy_blob};
use sessionshare::detect::{Format, detect};
use sessionshare::optimize::{EncodeOptions, Limits, optimize};
use sessionshare::transcript::{Body, Message, Part, Role, Transcript};

const SHARED_AT: &str = "2025-01-05T00:00:00Z";

fn role(user: bool) -> Role {
    if user { Role::User } else { Role::Assistant }
}

fn part() -> impl Strategy<Value = Part> {
    prop_oneof![
        "[a-c ]{0,8}".prop_map(|text| Part::Text { text }),
        ("[A-Z][a-z]{2,6}", "[a-z]{0,700}", 0usize..15).prop_map(|(name, content, n)| {
            Part::ToolInvocation {
                name,
                input: json!({"content": content, "items": (0..n).collect::<Vec<_>>()}),
            }
        }),
        Just(Part::Image { summary: None }),
    ]
}

fn body() -> impl Strategy<Value = Body> {
    prop_oneof![
        "[a-c ]{0,8}".prop_map(Body::Plain),
        "[a-z ]{0,400}".prop_map(Body::Plain),
        prop::collection::vec(part(), 0..4).prop_map(Body::Parts),
    ]
}

/// Small alphabets so duplicates and noise are common.
fn message() -> impl Strategy<Value = Message> {
    (
        any::<bool>(),
        body(),
        prop::option::of("2025-01-0[1-9]T1[0-9]:00:00Z"),
    )
        .prop_map(|(user, body, ts)| Message::new(role(user), ts, body))
}

fn transcript() -> impl Strategy<Value = Transcript> {
    (
        prop::collection::vec(message(), 0..60),
        prop::option::of("[A-Za-z ]{0,40}"),
    )
        .prop_map(|(messages, summary)| {
            let mut transcript = Transcript::new("prop-session", messages);
            transcript.summary = summary;
            transcript.project = Some("-work-prop".to_string());
            transcript
        })
}

/// Distinct plain messages that survive dedup and filtering.
fn indexed_transcript(max: usize) -> impl Strategy<Value = Transcript> {
    let item = (any::<bool>(), "[a-zA-Z0-9 éü日本]{0,300}");
    prop::collection::vec(item, 0..max).prop_map(|items| {
        let messages = items
            .into_iter()
            .enumerate()
            .map(|(i, (user, text))| Message::text(role(user), format!("msg{i:04}-{text}")))
            .collect();
        Transcript::new("indexed", messages)
    })
}

fn index_of(message: &Message) -> usize {
    message.body.text()[3..7].parse().unwrap()
}

fn options(budget: usize) -> EncodeOptions {
    EncodeOptions::new(SHARED_AT, Limits::with_budget(budget))
}

proptest! {
    #[test]
    fn encoded_size_never_exceeds_budget(t in transcript(), budget in 2_000usize..20_000) {
        let encoded = encode_jsonl(&t, &options(budget));
        prop_assert!(encoded.len() <= budget, "{} > {}", encoded.len(), budget);
    }

    #[test]
    fn cut_is_a_single_trailing_prefix(t in indexed_transcript(80), budget in 2_000usize..20_000) {
        let out = optimize(&t, &options(budget));
        let indices: Vec<usize> = out.messages.iter().map(index_of).collect();
        let expected: Vec<usize> = (0..out.messages.len()).collect();
        prop_assert_eq!(indices, expected);
        if out.messages.len() < t.messages.len() {
            let record = out.truncation.expect("cut without a truncation record");
            prop_assert_eq!(record.total_messages, t.messages.len());
            prop_assert_eq!(record.included_messages, out.messages.len());
        } else {
            prop_assert!(out.truncation.is_none());
        }
    }

    #[test]
    fn optimizing_twice_changes_nothing(t in transcript(), budget in 2_000usize..30_000) {
        let opts = options(budget);
        let once = optimize(&t, &opts);
        let twice = optimize(&once, &opts);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn jsonl_round_trip_keeps_roles_and_text(t in indexed_transcript(40)) {
        let decoded = decode_jsonl(&encode_jsonl(&t, &options(900_000))).unwrap();
        let expected: Vec<(Role, String)> =
            t.messages.iter().map(|m| (m.role, m.body.text())).collect();
        let actual: Vec<(Role, String)> =
            decoded.messages.iter().map(|m| (m.role, m.body.text())).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(decoded.id, "indexed");
        prop_assert!(decoded.truncation.is_none());
    }

    #[test]
    fn legacy_blob_round_trip(
        items in prop::collection::vec((any::<bool>(), "\\PC{0,500}"), 0..=10)
    ) {
        let messages: Vec<Message> = items
            .into_iter()
            .map(|(user, text)| Message::text(role(user), text))
            .collect();
        let t = Transcript::new("blob", messages);
        let decoded = decode_legacy_blob(&encode_legacy_blob(&t)).unwrap();
        prop_assert_eq!(decoded.messages, t.messages);
    }

    #[test]
    fn json_object_lines_are_jsonl(values in prop::collection::vec(any::<u32>(), 5..10)) {
        let content: String = values
            .iter()
            .map(|v| format!("{{\"type\":\"user\",\"n\":{v}}}\n"))
            .collect();
        prop_assert_eq!(detect(&content), Format::Jsonl);
    }
}
