//! Inbound message decoder.
//!
//! Turns raw frames into a [`DecodedMessage`]. Decoding never fails, it only
//! degrades:
//!
//! | Input text | Result |
//! |------------|--------|
//! | JSON object | The object, keys in source order |
//! | Other JSON value | `{ "value": <json> }` |
//! | Not JSON | `{ "0": c0, "1": c1, ... }`, one entry per character |

// ============================================================================
// Imports
// ============================================================================

use std::ops::Deref;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

use super::frame::Inbound;

// ============================================================================
// Constants
// ============================================================================

/// Key under which non-object JSON values are wrapped.
pub const VALUE_KEY: &str = "value";

// ============================================================================
// DecodedMessage
// ============================================================================

/// A decoded inbound message.
///
/// Always a key-ordered mapping, see the module docs for the shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedMessage(Map<String, Value>);

impl DecodedMessage {
    /// Returns the underlying map.
    #[inline]
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Returns the message as a JSON object value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Deref for DecodedMessage {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for DecodedMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one logical inbound message.
#[must_use]
pub fn decode(inbound: &Inbound) -> DecodedMessage {
    decode_text(&inbound.text())
}

/// Decodes message text.
#[must_use]
pub fn decode_text(text: &str) -> DecodedMessage {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => DecodedMessage(map),
        Ok(other) => {
            let mut map = Map::with_capacity(1);
            map.insert(VALUE_KEY.to_string(), other);
            DecodedMessage(map)
        }
        Err(e) => {
            trace!(error = %e, len = text.len(), "Inbound text is not JSON, using character map");
            char_map(text)
        }
    }
}

/// Maps each character to its stringified position.
fn char_map(text: &str) -> DecodedMessage {
    DecodedMessage(
        text.chars()
            .enumerate()
            .map(|(index, c)| (index.to_string(), Value::String(c.to_string())))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::protocol::frame::RawFrame;

    #[test]
    fn test_object_decodes_to_itself() {
        let decoded = decode_text(r#"{"x":1,"nested":{"y":[1,2]}}"#);
        assert_eq!(decoded.into_value(), json!({"x": 1, "nested": {"y": [1, 2]}}));
    }

    #[test]
    fn test_object_keeps_source_order() {
        let decoded = decode_text(r#"{"b":1,"a":2,"c":3}"#);
        let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_non_object_json_is_wrapped() {
        assert_eq!(decode_text("42").into_value(), json!({"value": 42}));
        assert_eq!(decode_text("[1,2]").into_value(), json!({"value": [1, 2]}));
        assert_eq!(decode_text("null").into_value(), json!({"value": null}));
        assert_eq!(decode_text("\"hi\"").into_value(), json!({"value": "hi"}));
    }

    #[test]
    fn test_invalid_json_falls_back_to_characters() {
        let decoded = decode_text("ok!");
        assert_eq!(decoded.into_value(), json!({"0": "o", "1": "k", "2": "!"}));
    }

    #[test]
    fn test_fallback_orders_indices_numerically() {
        let decoded = decode_text("hello world");
        let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys[9], "9");
        assert_eq!(keys[10], "10");
    }

    #[test]
    fn test_fallback_uses_characters_not_bytes() {
        let decoded = decode_text("é✓");
        assert_eq!(decoded.into_value(), json!({"0": "é", "1": "✓"}));
    }

    #[test]
    fn test_empty_text_is_empty_map() {
        assert!(decode_text("").is_empty());
    }

    #[test]
    fn test_binary_frame_decodes() {
        let inbound = Inbound::from(RawFrame::Binary(br#"{"x":1}"#.to_vec()));
        assert_eq!(decode(&inbound).into_value(), json!({"x": 1}));
    }

    #[test]
    fn test_fragments_decode_as_one_message() {
        let inbound = Inbound::from(vec![RawFrame::from(r#"{"x""#), RawFrame::from(":1}")]);
        assert_eq!(decode(&inbound).into_value(), json!({"x": 1}));
    }

    #[test]
    fn test_serializes_transparently() {
        let decoded = decode_text(r#"{"x":1}"#);
        assert_eq!(serde_json::to_string(&decoded).unwrap(), r#"{"x":1}"#);
    }

    fn json_object() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,8}".prop_map(Value::String),
        ];
        let value = leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("[a-z]{1,6}", value, 0..5)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    proptest! {
        #[test]
        fn prop_json_objects_decode_to_parsed_value(object in json_object()) {
            let text = serde_json::to_string(&object).unwrap();
            prop_assert_eq!(decode_text(&text).into_value(), object);
        }

        #[test]
        fn prop_non_json_maps_every_character(text in "[^\\[\\]{}\"0-9tfn -]{1,32}") {
            prop_assume!(serde_json::from_str::<Value>(&text).is_err());
            let decoded = decode_text(&text);
            let chars: Vec<char> = text.chars().collect();
            prop_assert_eq!(decoded.len(), chars.len());
            for (index, c) in chars.iter().enumerate() {
                prop_assert_eq!(decoded.get(&index.to_string()), Some(&Value::String(c.to_string())));
            }
        }

        #[test]
        fn prop_fragments_match_concatenation(parts in prop::collection::vec(".{0,6}", 0..6)) {
            let joined: String = parts.concat();
            let fragments = Inbound::from(
                parts.into_iter().map(RawFrame::from).collect::<Vec<_>>(),
            );
            prop_assert_eq!(decode(&fragments), decode_text(&joined));
        }
    }
}
