//! Property-based tests for codecs, path patterns, query parsing and
//! message matching.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_router::{
    parse_query, Client, ClientStatus, Frame, JsonCodec, Matcher, MessageKind, MockSocket, Parser,
    PathPattern, Registry, Serializer,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Generate a scalar JSON value
fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "\\PC{0,24}".prop_map(Value::String),
    ]
}

/// Generate a nested JSON document
fn json_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A path segment: literal text or a parameter value
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

fn segments_strategy() -> impl Strategy<Value = Vec<Segment>> {
    prop::collection::vec(
        prop_oneof![
            "[a-z][a-z0-9-]{0,10}".prop_map(Segment::Literal),
            "[A-Za-z0-9_.-]{1,12}".prop_map(Segment::Param),
        ],
        1..6,
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: JSON serialization then parsing yields the same payload
    #[test]
    fn prop_json_codec_roundtrip(value in json_strategy()) {
        let frame = JsonCodec.serialize(&value).unwrap();
        prop_assert!(!frame.is_binary());

        let parsed = JsonCodec.parse(&frame).unwrap();
        prop_assert_eq!(parsed, value);
    }

    /// Property: a path built from a pattern matches it and yields the
    /// parameter values back by name
    #[test]
    fn prop_path_params_extracted(segments in segments_strategy()) {
        let mut pattern = String::new();
        let mut path = String::new();
        let mut expected = HashMap::new();

        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    pattern.push_str(&format!("/{text}"));
                    path.push_str(&format!("/{text}"));
                }
                Segment::Param(value) => {
                    let name = format!("p{index}");
                    pattern.push_str(&format!("/{{{name}}}"));
                    path.push_str(&format!("/{value}"));
                    expected.insert(name, value.clone());
                }
            }
        }

        let pattern = PathPattern::parse(pattern);
        prop_assert!(pattern.matches(&path));
        prop_assert_eq!(pattern.extract_params(&path), expected);

        let longer = format!("{path}/extra");
        prop_assert!(!pattern.matches(&longer));
    }

    /// Property: encoded query strings decode to the original map
    #[test]
    fn prop_query_roundtrip(
        params in prop::collection::hash_map("[a-z]{1,8}", "\\PC{0,16}", 0..8)
    ) {
        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        prop_assert_eq!(parse_query(&query), params);
    }

    /// Property: among declarations with distinct discriminants, the one
    /// whose value the payload carries is found
    #[test]
    fn prop_matcher_selects_declaration(
        kinds in prop::collection::btree_set("[a-z]{1,6}(:[a-z]{1,6})?", 1..10),
        pick in any::<prop::sample::Index>(),
        extra in "\\PC{0,12}",
    ) {
        let kinds: Vec<String> = kinds.into_iter().collect();
        let mut registry = Registry::new();
        for kind in &kinds {
            registry.register_server(Matcher::field_eq("type", kind.as_str()), None);
        }

        let index = pick.index(kinds.len());
        let payload = serde_json::json!({"type": kinds[index], "extra": extra});

        let found = registry.find(MessageKind::Server, &payload).unwrap();
        let expected = registry.iter().nth(index).unwrap();
        prop_assert!(Arc::ptr_eq(&found, expected));
        prop_assert!(registry.find(MessageKind::Client, &payload).is_none());
    }

    /// Property: client status never moves backwards
    #[test]
    fn prop_status_is_monotonic(steps in prop::collection::vec(0u8..4, 0..20)) {
        let (socket, _rx) = MockSocket::new();
        let client = Client::new(socket, "/");
        let mut highest = ClientStatus::Connecting;

        for step in steps {
            let next = match step {
                0 => ClientStatus::Connecting,
                1 => ClientStatus::Connected,
                2 => ClientStatus::Disconnecting,
                _ => ClientStatus::Disconnected,
            };
            let advanced = client.advance_status(next);
            prop_assert_eq!(advanced, next > highest);
            highest = highest.max(next);
            prop_assert_eq!(client.status(), highest);
        }
    }

    /// Property: a text frame's error-report value is the text itself
    #[test]
    fn prop_text_frame_value(text in "\\PC{0,32}") {
        prop_assert_eq!(Frame::text(text.clone()).to_value(), Value::String(text));
    }
}
