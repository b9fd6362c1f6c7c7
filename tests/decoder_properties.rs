//! Property tests for the incremental JSON-lines decoder
//!
//! These verify that the decoded messages never depend on where the pipe
//! happened to split the output.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use siphon::subprocess::streaming::{IncrementalLineJsonDecoder, Utf8Decoder};

fn message() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 é🦀{}\\[\\]\"\\\\]{0,12}".prop_map(Value::from),
        Just(Value::Null),
    ];
    let value = leaf.prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    });
    prop::collection::btree_map("[a-z_]{1,8}", value, 1..5)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

fn encode(messages: &[Value], trailing_newline: bool) -> Vec<u8> {
    let lines: Vec<String> = messages
        .iter()
        .map(|m| serde_json::to_string(m).unwrap())
        .collect();
    let mut text = lines.join("\n");
    if trailing_newline {
        text.push('\n');
    }
    text.into_bytes()
}

/// Feed `bytes` split at `cuts` and return everything decoded, flush included
fn decode_split(bytes: &[u8], cuts: &[usize]) -> Vec<Value> {
    let mut utf8 = Utf8Decoder::new();
    let mut decoder = IncrementalLineJsonDecoder::new();
    let mut out = Vec::new();

    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        let end = cut.clamp(start, bytes.len());
        out.extend(decoder.feed(&utf8.push(&bytes[start..end])));
        start = end;
    }
    out.extend(decoder.feed(&utf8.finish()));
    out.extend(decoder.finish().unwrap());
    out
}

proptest! {
    #[test]
    fn prop_split_points_do_not_change_output(
        messages in prop::collection::vec(message(), 1..8),
        trailing_newline in any::<bool>(),
        cut_fractions in prop::collection::vec(0.0f64..1.0, 0..12),
    ) {
        let bytes = encode(&messages, trailing_newline);
        let mut cuts: Vec<usize> = cut_fractions
            .iter()
            .map(|f| (f * bytes.len() as f64) as usize)
            .collect();
        cuts.sort_unstable();

        prop_assert_eq!(decode_split(&bytes, &cuts), messages);
    }

    #[test]
    fn prop_every_single_byte_split(messages in prop::collection::vec(message(), 1..4)) {
        let bytes = encode(&messages, true);
        let cuts: Vec<usize> = (1..bytes.len()).collect();
        prop_assert_eq!(decode_split(&bytes, &cuts), messages);
    }

    #[test]
    fn prop_whole_lines_in_one_fragment(messages in prop::collection::vec(message(), 1..16)) {
        let bytes = encode(&messages, true);
        let text = String::from_utf8(bytes).unwrap();

        let mut decoder = IncrementalLineJsonDecoder::new();
        let decoded = decoder.feed(&text);
        prop_assert_eq!(decoded.len(), messages.len());
        prop_assert_eq!(decoded, messages);
        prop_assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn prop_blank_lines_are_ignored(
        messages in prop::collection::vec(message(), 1..6),
        padding in prop::collection::vec("[ \t\r]{0,3}", 1..6),
    ) {
        let mut text = String::new();
        for (i, m) in messages.iter().enumerate() {
            text.push_str(&padding[i % padding.len()]);
            text.push('\n');
            text.push_str(&serde_json::to_string(m).unwrap());
            text.push('\n');
        }

        let mut decoder = IncrementalLineJsonDecoder::new();
        let mut decoded = decoder.feed(&text);
        decoded.extend(decoder.finish().unwrap());
        prop_assert_eq!(decoded, messages);
    }
}

#[test]
fn test_pretty_printed_document_is_recovered_at_close() {
    let document = json!({"type": "result", "items": [1, 2, 3]});
    let text = serde_json::to_string_pretty(&document).unwrap();

    let mut decoder = IncrementalLineJsonDecoder::new();
    assert!(decoder.feed(&text).is_empty());
    assert!(decoder.deferral_count() > 0);
    assert_eq!(decoder.finish().unwrap(), Some(document));
}
