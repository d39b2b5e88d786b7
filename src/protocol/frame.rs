//! Raw frame types.
//!
//! Inbound data arrives either as one frame or as an ordered group of
//! fragments that form one logical message. Outbound data is always a
//! text frame.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use serde_json::Value;

use crate::error::Result;

// ============================================================================
// RawFrame
// ============================================================================

/// A single raw frame as delivered by the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl RawFrame {
    /// Coerces the frame to text.
    ///
    /// Binary payloads are read as UTF-8; invalid sequences become U+FFFD.
    #[must_use]
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for RawFrame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RawFrame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// One logical inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A single frame.
    Frame(RawFrame),
    /// Ordered fragments, concatenated before decoding.
    Fragments(Vec<RawFrame>),
}

impl Inbound {
    /// Returns the full message text.
    ///
    /// Fragments are coerced to text one by one and joined in order.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Frame(frame) => frame.to_text(),
            Self::Fragments(fragments) => Cow::Owned(
                fragments
                    .iter()
                    .map(RawFrame::to_text)
                    .collect::<String>(),
            ),
        }
    }
}

impl From<RawFrame> for Inbound {
    fn from(frame: RawFrame) -> Self {
        Self::Frame(frame)
    }
}

impl From<Vec<RawFrame>> for Inbound {
    fn from(fragments: Vec<RawFrame>) -> Self {
        Self::Fragments(fragments)
    }
}

impl From<&str> for Inbound {
    fn from(text: &str) -> Self {
        Self::Frame(RawFrame::from(text))
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Data handed to `send`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Sent unchanged.
    Text(String),
    /// Serialized to compact JSON.
    Json(Value),
}

impl Outbound {
    /// Produces the text frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_text_frame_borrows() {
        let frame = RawFrame::from("hello");
        assert!(matches!(frame.to_text(), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_binary_frame_lossy() {
        let frame = RawFrame::Binary(vec![b'h', b'i', 0xff]);
        assert_eq!(frame.to_text(), "hi\u{fffd}");
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let inbound = Inbound::from(vec![
            RawFrame::from("{\"a\":"),
            RawFrame::Binary(b"1".to_vec()),
            RawFrame::from("}"),
        ]);
        assert_eq!(inbound.text(), "{\"a\":1}");
    }

    #[test]
    fn test_empty_fragments() {
        let inbound = Inbound::Fragments(Vec::new());
        assert_eq!(inbound.text(), "");
    }

    #[test]
    fn test_outbound_text_passthrough() {
        let text = Outbound::from("raw {not json").into_text().unwrap();
        assert_eq!(text, "raw {not json");
    }

    #[test]
    fn test_outbound_json_serialized() {
        let text = Outbound::from(json!({"action": "register", "accessCode": ""}))
            .into_text()
            .unwrap();
        assert_eq!(text, r#"{"action":"register","accessCode":""}"#);
    }

    #[test]
    fn test_outbound_json_string_is_text() {
        let outbound = Outbound::from(json!("ping"));
        assert_eq!(outbound, Outbound::Text("ping".into()));
    }
}
